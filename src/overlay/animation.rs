//! Frame-by-frame animation on the UI timer queue

use std::rc::Rc;
use std::time::{Duration, Instant};

use super::{Picture, Surface, TimerId, TimerQueue};

/// Shortest delay between frames; guards against zero-delay GIFs
pub const MIN_FRAME_DELAY: Duration = Duration::from_millis(10);

struct Animation {
    picture: Rc<Picture>,
    index: usize,
    timer: Option<TimerId>,
}

/// Drives at most one animation at a time
#[derive(Default)]
pub struct AnimationScheduler {
    active: Option<Animation>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any running animation and start `picture` from its first frame
    pub fn start(
        &mut self,
        picture: Rc<Picture>,
        surface: &mut dyn Surface,
        timers: &mut TimerQueue,
        now: Instant,
    ) {
        self.cancel(timers);
        self.active = Some(Animation {
            picture,
            index: 0,
            timer: None,
        });
        self.advance(surface, timers, now);
    }

    /// Show the current frame and schedule the next one
    pub fn advance(&mut self, surface: &mut dyn Surface, timers: &mut TimerQueue, now: Instant) {
        let Some(animation) = self.active.as_mut() else {
            return;
        };

        let frame = &animation.picture.frames()[animation.index];
        surface.show_frame(&frame.image, animation.index);

        let delay = frame.delay.max(MIN_FRAME_DELAY);
        animation.index = (animation.index + 1) % animation.picture.frame_count();
        animation.timer = Some(timers.schedule_at(now + delay));
    }

    /// Handle a fired timer. Returns false if it does not belong to the
    /// running animation (stale or foreign), in which case nothing happens.
    pub fn on_timer(
        &mut self,
        id: TimerId,
        surface: &mut dyn Surface,
        timers: &mut TimerQueue,
        now: Instant,
    ) -> bool {
        let owned = self
            .active
            .as_ref()
            .is_some_and(|animation| animation.timer == Some(id));
        if owned {
            self.advance(surface, timers, now);
        }
        owned
    }

    /// Stop scheduling frames
    pub fn cancel(&mut self, timers: &mut TimerQueue) {
        if let Some(animation) = self.active.take() {
            if let Some(id) = animation.timer {
                timers.cancel(id);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Index of the frame that will be shown next
    pub fn next_index(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.index)
    }
}
