//! Overlay controller
//!
//! Owns the anchor and the displayed mode. The anchor is fixed at the first
//! successful placement and afterwards only moves when the user drags the
//! window. Every mode is shown at `anchor + offset`; the default mode sits
//! exactly on the anchor.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use super::{AnimationScheduler, ImageLoader, Offset, Picture, Point, Surface, TimerQueue};
use crate::config::{DisplayProfile, DisplayProfiles};
use crate::error::RenderError;
use crate::mode::Mode;

/// Identity of a loaded image; equal keys never reload
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImageKey {
    path: PathBuf,
    max_width: u32,
    max_height: u32,
}

impl From<&DisplayProfile> for ImageKey {
    fn from(profile: &DisplayProfile) -> Self {
        Self {
            path: profile.image.clone(),
            max_width: profile.max_width,
            max_height: profile.max_height,
        }
    }
}

struct LoadedImage {
    key: ImageKey,
    picture: Rc<Picture>,
}

/// Drives image display and window placement on the UI thread
pub struct OverlayController<S: Surface, L: ImageLoader> {
    surface: S,
    loader: L,
    profiles: DisplayProfiles,
    anchor: Option<Point>,
    position: Option<Point>,
    current_mode: Mode,
    /// Displacement of the current mode from the anchor
    current_offset: Offset,
    /// Mode received before the first placement
    pending_mode: Option<Mode>,
    loaded: Option<LoadedImage>,
    animation: AnimationScheduler,
    timers: TimerQueue,
}

impl<S: Surface, L: ImageLoader> OverlayController<S, L> {
    pub fn new(surface: S, loader: L, profiles: DisplayProfiles) -> Self {
        Self {
            surface,
            loader,
            profiles,
            anchor: None,
            position: None,
            current_mode: Mode::default(),
            current_offset: Offset::default(),
            pending_mode: None,
            loaded: None,
            animation: AnimationScheduler::new(),
            timers: TimerQueue::new(),
        }
    }

    /// Establish the anchor and show the default image.
    ///
    /// Does nothing once placed. Returns false while the surface cannot
    /// report its display area yet; the caller should retry later.
    pub fn place_initial(&mut self, now: Instant) -> bool {
        if self.anchor.is_some() {
            return true;
        }

        let Some(area) = self.surface.work_area() else {
            tracing::debug!("Display area unknown, deferring placement");
            return false;
        };

        let profile = self.profiles.default_profile().clone();
        let anchor = Point::new(
            area.right()
                .saturating_sub_unsigned(profile.max_width)
                .saturating_sub(profile.x_offset),
            area.bottom()
                .saturating_sub_unsigned(profile.max_height)
                .saturating_sub(profile.y_offset),
        );

        self.anchor = Some(anchor);
        self.current_mode = Mode::default();
        self.current_offset = Offset::default();

        if let Err(e) = self.display(&profile, now) {
            tracing::error!("Error loading default image: {}", e);
        }
        self.move_window(anchor);
        tracing::debug!("Set initial position to {}, {}", anchor.x, anchor.y);

        if let Some(mode) = self.pending_mode.take() {
            self.on_mode_changed(&mode, now);
        }
        true
    }

    /// Switch the overlay to `mode`.
    ///
    /// Failures to load the new image are logged and leave the previous
    /// image, size and position in place.
    pub fn on_mode_changed(&mut self, mode: &Mode, now: Instant) {
        if self.anchor.is_none() {
            tracing::debug!("Mode {} arrived before placement, deferring", mode);
            self.pending_mode = Some(mode.clone());
            return;
        }

        if *mode == self.current_mode {
            return;
        }

        let (profile, offset) = match self.profiles.get(mode) {
            Some(profile) if mode.is_default() => (profile.clone(), Offset::default()),
            Some(profile) => (
                profile.clone(),
                Offset {
                    dx: profile.x_offset,
                    dy: profile.y_offset,
                },
            ),
            None => {
                tracing::warn!("Display mode {} not found, using default", mode);
                let profile = self.profiles.default_profile().clone();
                let offset = Offset {
                    dx: profile.x_offset,
                    dy: profile.y_offset,
                };
                (profile, offset)
            }
        };

        if let Err(e) = self.display(&profile, now) {
            tracing::error!("Keeping previous image for mode {}: {}", mode, e);
            return;
        }

        let old_mode = std::mem::replace(&mut self.current_mode, mode.clone());
        self.current_offset = offset;

        if let Some(anchor) = self.anchor {
            self.move_window(anchor + offset);
        }
        tracing::debug!("Mode changed from {} to {}", old_mode, mode);
    }

    /// The user dragged the window to `position`; re-derive the anchor from it
    pub fn on_user_moved(&mut self, position: Point) {
        if self.anchor.is_none() || self.position == Some(position) {
            return;
        }

        let anchor = Point::new(
            position.x.saturating_sub(self.current_offset.dx),
            position.y.saturating_sub(self.current_offset.dy),
        );
        self.anchor = Some(anchor);
        self.position = Some(position);
        tracing::debug!("Updated base position to {}, {} after drag", anchor.x, anchor.y);
    }

    /// Apply one UI tick: a finished drag first, so a pending mode is
    /// placed against the new anchor, then the mode, then due timers.
    pub fn advance(
        &mut self,
        dropped_at: Option<Point>,
        pending: Option<&Mode>,
        now: Instant,
    ) -> Option<Instant> {
        if let Some(position) = dropped_at {
            self.on_user_moved(position);
        }
        if let Some(mode) = pending {
            self.on_mode_changed(mode, now);
        }
        self.poll_timers(now)
    }

    /// Fire due timers. Returns the next deadline, if any.
    pub fn poll_timers(&mut self, now: Instant) -> Option<Instant> {
        while let Some(id) = self.timers.pop_due(now) {
            if !self
                .animation
                .on_timer(id, &mut self.surface, &mut self.timers, now)
            {
                tracing::trace!("Ignoring stale timer {:?}", id);
            }
        }
        self.timers.next_deadline()
    }

    /// Stop animating; called once on shutdown
    pub fn shutdown(&mut self) {
        self.animation.cancel(&mut self.timers);
    }

    /// Load, scale and show the profile's image unless it is already shown
    fn display(&mut self, profile: &DisplayProfile, now: Instant) -> Result<(), RenderError> {
        let key = ImageKey::from(profile);
        if self.loaded.as_ref().is_some_and(|loaded| loaded.key == key) {
            return Ok(());
        }

        let picture = self
            .loader
            .load(&key.path)?
            .scaled_to_fit(key.max_width, key.max_height);
        let picture = Rc::new(picture);

        self.animation.cancel(&mut self.timers);
        if picture.is_animated() {
            self.animation
                .start(picture.clone(), &mut self.surface, &mut self.timers, now);
        } else {
            self.surface.show_image(&picture.frames()[0].image);
        }

        let size = picture.size();
        self.surface.resize(size);
        tracing::debug!(
            "Loaded {} ({}x{}, {} frame(s))",
            key.path.display(),
            size.width,
            size.height,
            picture.frame_count()
        );

        self.loaded = Some(LoadedImage { key, picture });
        Ok(())
    }

    fn move_window(&mut self, position: Point) {
        self.surface.move_to(position);
        self.position = Some(position);
    }

    pub fn anchor(&self) -> Option<Point> {
        self.anchor
    }

    pub fn position(&self) -> Option<Point> {
        self.position
    }

    pub fn current_mode(&self) -> &Mode {
        &self.current_mode
    }

    pub fn is_placed(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_active()
    }

    /// Picture currently on screen
    pub fn picture(&self) -> Option<&Picture> {
        self.loaded.as_ref().map(|loaded| loaded.picture.as_ref())
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{mode_channel, ModeClassifier, ThresholdTable};
    use crate::overlay::{PictureFrame, Rect, Size};
    use image::{Rgba, RgbaImage};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Move(Point),
        Resize(Size),
        Image(u8),
        Frame(u8, usize),
    }

    struct RecordingSurface {
        area: Option<Rect>,
        calls: Vec<Call>,
    }

    impl RecordingSurface {
        fn new(area: Option<Rect>) -> Self {
            Self {
                area,
                calls: Vec::new(),
            }
        }

        fn moves(&self) -> Vec<Point> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Move(p) => Some(*p),
                    _ => None,
                })
                .collect()
        }

        /// Tag of the image most recently put on screen
        fn shown(&self) -> Option<u8> {
            self.calls.iter().rev().find_map(|c| match c {
                Call::Image(tag) | Call::Frame(tag, _) => Some(*tag),
                _ => None,
            })
        }
    }

    impl Surface for RecordingSurface {
        fn work_area(&self) -> Option<Rect> {
            self.area
        }
        fn move_to(&mut self, position: Point) {
            self.calls.push(Call::Move(position));
        }
        fn resize(&mut self, size: Size) {
            self.calls.push(Call::Resize(size));
        }
        fn show_image(&mut self, image: &RgbaImage) {
            self.calls.push(Call::Image(image.get_pixel(0, 0)[0]));
        }
        fn show_frame(&mut self, image: &RgbaImage, index: usize) {
            self.calls.push(Call::Frame(image.get_pixel(0, 0)[0], index));
        }
    }

    /// Serves pictures from memory and records every load
    #[derive(Default)]
    struct FakeLoader {
        pictures: HashMap<PathBuf, Picture>,
        loads: RefCell<Vec<PathBuf>>,
    }

    impl FakeLoader {
        fn with(mut self, name: &str, picture: Picture) -> Self {
            self.pictures.insert(PathBuf::from(name), picture);
            self
        }

        fn load_count(&self, name: &str) -> usize {
            self.loads
                .borrow()
                .iter()
                .filter(|p| p.as_path() == Path::new(name))
                .count()
        }
    }

    impl ImageLoader for FakeLoader {
        fn load(&self, path: &Path) -> Result<Picture, RenderError> {
            self.loads.borrow_mut().push(path.to_path_buf());
            self.pictures
                .get(path)
                .cloned()
                .ok_or_else(|| RenderError::NotFound(path.to_path_buf()))
        }
    }

    fn still(tag: u8, w: u32, h: u32) -> Picture {
        Picture::still(RgbaImage::from_pixel(w, h, Rgba([tag, 0, 0, 255])))
    }

    fn animated(tag: u8, frames: usize) -> Picture {
        Picture::animated(
            (0..frames)
                .map(|_| PictureFrame {
                    image: RgbaImage::from_pixel(50, 50, Rgba([tag, 0, 0, 255])),
                    delay: Duration::from_millis(100),
                })
                .collect(),
        )
        .unwrap()
    }

    fn profile(image: &str, x_offset: i32, y_offset: i32) -> DisplayProfile {
        DisplayProfile {
            image: PathBuf::from(image),
            max_width: 100,
            max_height: 100,
            x_offset,
            y_offset,
        }
    }

    fn profiles() -> DisplayProfiles {
        DisplayProfiles::new(profile("normal.png", 50, 50))
            .with_profile("talking", profile("talking.png", 0, -10))
            .with_profile("screaming", profile("screaming.png", 0, -25))
    }

    fn loader() -> FakeLoader {
        FakeLoader::default()
            .with("normal.png", still(1, 80, 80))
            .with("talking.png", still(2, 80, 80))
            .with("screaming.png", still(3, 400, 200))
    }

    /// Work area whose anchor lands on (1000, 800) for the default profile
    fn area_for_anchor() -> Rect {
        Rect::new(0, 0, 1000 + 100 + 50, 800 + 100 + 50)
    }

    fn placed(loader: FakeLoader) -> OverlayController<RecordingSurface, FakeLoader> {
        let mut c = OverlayController::new(
            RecordingSurface::new(Some(area_for_anchor())),
            loader,
            profiles(),
        );
        assert!(c.place_initial(Instant::now()));
        c
    }

    #[test]
    fn test_initial_placement_bottom_right() {
        let mut c = OverlayController::new(
            RecordingSurface::new(Some(Rect::new(0, 0, 1920, 1080))),
            loader(),
            profiles(),
        );
        assert!(c.place_initial(Instant::now()));

        assert_eq!(c.anchor(), Some(Point::new(1770, 930)));
        assert_eq!(
            c.surface().calls,
            vec![
                Call::Image(1),
                Call::Resize(Size::new(80, 80)),
                Call::Move(Point::new(1770, 930)),
            ]
        );
    }

    #[test]
    fn test_initial_placement_idempotent() {
        let mut c = placed(loader());
        let calls = c.surface().calls.len();

        assert!(c.place_initial(Instant::now()));
        assert_eq!(c.surface().calls.len(), calls);
        assert_eq!(c.loader().load_count("normal.png"), 1);
    }

    #[test]
    fn test_placement_deferred_until_area_known() {
        let mut c = OverlayController::new(RecordingSurface::new(None), loader(), profiles());
        let now = Instant::now();

        assert!(!c.place_initial(now));
        c.on_mode_changed(&Mode::new("talking"), now);
        assert!(c.surface().calls.is_empty());

        c.surface_mut().area = Some(area_for_anchor());
        assert!(c.place_initial(now));
        assert_eq!(c.current_mode(), &Mode::new("talking"));
        assert_eq!(c.position(), Some(Point::new(1000, 790)));
    }

    #[test]
    fn test_reposition_relative_to_anchor() {
        let mut c = placed(loader());
        let now = Instant::now();

        c.on_mode_changed(&Mode::new("screaming"), now);
        assert_eq!(c.position(), Some(Point::new(1000, 775)));

        c.on_mode_changed(&Mode::default(), now);
        assert_eq!(c.position(), Some(Point::new(1000, 800)));
        assert_eq!(c.anchor(), Some(Point::new(1000, 800)));
    }

    #[test]
    fn test_same_mode_is_noop() {
        let mut c = placed(loader());
        let now = Instant::now();

        c.on_mode_changed(&Mode::new("talking"), now);
        c.on_mode_changed(&Mode::new("talking"), now);

        assert_eq!(c.loader().load_count("talking.png"), 1);
        assert_eq!(
            c.surface().moves(),
            vec![Point::new(1000, 800), Point::new(1000, 790)]
        );
    }

    #[test]
    fn test_scaled_to_profile_bounds() {
        let mut c = placed(loader());
        c.on_mode_changed(&Mode::new("screaming"), Instant::now());

        assert_eq!(c.picture().unwrap().size(), Size::new(100, 50));
        assert!(c.surface().calls.contains(&Call::Resize(Size::new(100, 50))));
    }

    #[test]
    fn test_missing_image_keeps_previous() {
        let loader = FakeLoader::default()
            .with("normal.png", still(1, 80, 80))
            .with("screaming.png", still(3, 80, 80));
        let mut c = placed(loader);
        let calls = c.surface().calls.clone();

        c.on_mode_changed(&Mode::new("talking"), Instant::now());

        assert_eq!(c.loader().load_count("talking.png"), 1);
        assert_eq!(c.surface().calls, calls);
        assert_eq!(c.surface().shown(), Some(1));
        assert_eq!(c.current_mode(), &Mode::default());
        assert_eq!(c.position(), Some(Point::new(1000, 800)));
    }

    #[test]
    fn test_unknown_mode_falls_back_to_default_profile() {
        let mut c = placed(loader());
        c.on_mode_changed(&Mode::new("whisper"), Instant::now());

        // Same image as default: no reload, but the default offset applies
        assert_eq!(c.loader().load_count("normal.png"), 1);
        assert_eq!(c.current_mode(), &Mode::new("whisper"));
        assert_eq!(c.position(), Some(Point::new(1050, 850)));

        c.on_mode_changed(&Mode::default(), Instant::now());
        assert_eq!(c.position(), Some(Point::new(1000, 800)));
    }

    #[test]
    fn test_extreme_offsets_saturate() {
        let profiles = DisplayProfiles::new(profile("normal.png", i32::MIN, i32::MAX))
            .with_profile("talking", profile("talking.png", i32::MAX, i32::MIN));
        let mut c = OverlayController::new(
            RecordingSurface::new(Some(Rect::new(0, 0, u32::MAX, 1080))),
            loader(),
            profiles,
        );
        assert!(c.place_initial(Instant::now()));
        assert_eq!(c.anchor(), Some(Point::new(i32::MAX, 980 - i32::MAX)));

        c.on_mode_changed(&Mode::new("talking"), Instant::now());
        assert_eq!(c.position(), Some(Point::new(i32::MAX, i32::MIN)));

        c.on_user_moved(Point::new(i32::MIN, i32::MAX));
        assert_eq!(c.anchor(), Some(Point::new(i32::MIN, i32::MAX)));
    }

    #[test]
    fn test_animation_runs_and_is_cancelled_on_mode_change() {
        let loader = loader().with("talking.png", animated(7, 3));
        let mut c = placed(loader);
        let t0 = Instant::now();

        c.on_mode_changed(&Mode::new("talking"), t0);
        assert!(c.is_animating());
        assert_eq!(c.surface().shown(), Some(7));

        let next = c.poll_timers(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(next, t0 + Duration::from_millis(200));
        assert!(c.surface().calls.contains(&Call::Frame(7, 1)));

        c.on_mode_changed(&Mode::new("screaming"), t0 + Duration::from_millis(150));
        assert!(!c.is_animating());
        assert_eq!(c.poll_timers(t0 + Duration::from_secs(5)), None);
        assert_eq!(c.surface().shown(), Some(3));
    }

    #[test]
    fn test_user_drag_moves_anchor() {
        let mut c = placed(loader());
        let now = Instant::now();

        c.on_mode_changed(&Mode::new("talking"), now);
        c.on_user_moved(Point::new(400, 300));
        assert_eq!(c.anchor(), Some(Point::new(400, 310)));

        c.on_mode_changed(&Mode::default(), now);
        assert_eq!(c.position(), Some(Point::new(400, 310)));
    }

    #[test]
    fn test_drag_applied_before_pending_mode() {
        let mut c = placed(loader());

        c.advance(Some(Point::new(400, 300)), Some(&Mode::new("talking")), Instant::now());

        assert_eq!(c.anchor(), Some(Point::new(400, 300)));
        assert_eq!(c.position(), Some(Point::new(400, 290)));
        assert_eq!(c.surface().moves().last(), Some(&Point::new(400, 290)));
    }

    #[test]
    fn test_pipeline_from_loudness_to_position() {
        let mut c = placed(loader());
        let (tx, rx) = mode_channel();
        let mut classifier = ModeClassifier::new(
            ThresholdTable::new([("talking", 20.0), ("screaming", 2000.0)]),
            Duration::from_millis(500),
        );

        let t0 = Instant::now();
        let mut positions = Vec::new();
        for (i, rms) in [5.0, 30.0, 2500.0, 30.0, 5.0, 5.0, 5.0].into_iter().enumerate() {
            let now = t0 + Duration::from_millis(200 * i as u64);
            if let Some(mode) = classifier.observe(rms, now) {
                tx.send(mode);
            }
            if let Some(mode) = rx.try_recv() {
                c.on_mode_changed(&mode, now);
            }
            positions.push(c.position().unwrap().y);
        }

        assert_eq!(positions, vec![800, 790, 775, 790, 790, 790, 800]);
    }
}
