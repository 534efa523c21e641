//! Vertical scroll state with kinetic flick animation.
//!
//! The offset is the position of the content relative to the top of the
//! view: 0 shows the top, negative values scroll the content up. It is kept
//! within `[lower_bound, 0]` after every mutation.

use std::time::Duration;

/// Velocity (px/s) under which a flick animation stops.
const TERMINAL_VELOCITY: f32 = 30.0;

/// Nominal frame rate the friction factors are expressed against.
const FRAMES_PER_SECOND: f32 = 60.0;

/// How quickly a flick slows down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Friction {
    #[default]
    Low,
    Medium,
    High,
}

impl Friction {
    /// Fraction of velocity kept per nominal frame.
    fn retention(self) -> f32 {
        match self {
            Friction::Low => 0.95,
            Friction::Medium => 0.92,
            Friction::High => 0.85,
        }
    }
}

/// Decelerating motion seeded by a flick.
#[derive(Debug, Clone, PartialEq)]
pub struct KineticDecay {
    /// Vertical velocity in px/s, positive moves content down
    velocity: f32,
    friction: Friction,
    /// Sub-pixel motion not yet delivered
    remainder: f32,
}

impl KineticDecay {
    /// `direction` is the flick angle in radians with screen y pointing
    /// down, so `PI / 2` is a downward flick.
    pub fn new(speed: f32, direction: f32, friction: Friction) -> Self {
        Self {
            velocity: speed * direction.sin(),
            friction,
            remainder: 0.0,
        }
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Advance by `dt`, returning the whole-pixel delta and whether this was
    /// the last frame.
    fn step(&mut self, dt: Duration) -> (i32, bool) {
        let seconds = dt.as_secs_f32();
        let travel = self.velocity * seconds + self.remainder;
        let delta = travel.trunc();
        self.remainder = travel - delta;

        self.velocity *= self.friction.retention().powf(seconds * FRAMES_PER_SECOND);
        let last = self.velocity.abs() < TERMINAL_VELOCITY;
        (delta as i32, last)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Animation {
    Kinetic(KineticDecay),
    /// Jump to the offset on the next frame.
    Snap(i32),
}

/// Observable state of a [`ScrollController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    Idle,
    Dragging,
    Animating,
}

/// One animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollFrame {
    /// Offset change actually applied after clamping
    pub delta: i32,
    pub last: bool,
}

/// Scroll offset, bounds and the gesture state machine driving them.
#[derive(Debug, Clone)]
pub struct ScrollController {
    offset: i32,
    lower_bound: i32,
    dragging: bool,
    animation: Option<Animation>,
    friction: Friction,
}

impl ScrollController {
    pub fn new(lower_bound: i32) -> Self {
        Self {
            offset: 0,
            lower_bound: lower_bound.min(0),
            dragging: false,
            animation: None,
            friction: Friction::default(),
        }
    }

    pub fn with_friction(mut self, friction: Friction) -> Self {
        self.friction = friction;
        self
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn lower_bound(&self) -> i32 {
        self.lower_bound
    }

    /// Always 0: the content top.
    pub fn upper_bound(&self) -> i32 {
        0
    }

    pub fn phase(&self) -> ScrollPhase {
        if self.dragging {
            ScrollPhase::Dragging
        } else if self.animation.is_some() {
            ScrollPhase::Animating
        } else {
            ScrollPhase::Idle
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Velocity of the running flick, if any.
    pub fn velocity(&self) -> Option<f32> {
        match &self.animation {
            Some(Animation::Kinetic(decay)) => Some(decay.velocity()),
            _ => None,
        }
    }

    /// Update the lower bound (content taller than the view gives a
    /// negative bound). Positive values are treated as 0.
    pub fn set_lower_bound(&mut self, lower_bound: i32) {
        self.lower_bound = lower_bound.min(0);
        self.clamp();
    }

    /// Reclamp the offset into the bounds. Returns true if it moved.
    pub fn clamp(&mut self) -> bool {
        let clamped = self.offset.clamp(self.lower_bound, 0);
        let moved = clamped != self.offset;
        if moved {
            log::trace!("scroll clamped {} -> {clamped}", self.offset);
            self.offset = clamped;
        }
        moved
    }

    /// Set the offset directly, clamped.
    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
        self.clamp();
    }

    /// Apply `delta` and clamp. Returns the change actually applied.
    fn apply(&mut self, delta: i32) -> i32 {
        let before = self.offset;
        self.offset = self.offset.saturating_add(delta);
        self.clamp();
        self.offset - before
    }

    /// Finger down. Interrupts any animation immediately; the offset stays
    /// where the animation left it.
    pub fn begin_drag(&mut self) {
        if self.animation.take().is_some() {
            log::trace!("animation interrupted by drag at offset {}", self.offset);
        }
        self.dragging = true;
    }

    /// One drag event of `delta` pixels.
    pub fn drag(&mut self, delta: i32) -> i32 {
        if !self.dragging {
            self.begin_drag();
        }
        self.apply(delta)
    }

    /// Finger lifted without a flick.
    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    /// Finger lifted while moving: start a kinetic animation.
    pub fn flick(&mut self, speed: f32, direction: f32) {
        self.dragging = false;
        let decay = KineticDecay::new(speed, direction, self.friction);
        if decay.velocity().abs() < TERMINAL_VELOCITY {
            self.animation = None;
            return;
        }
        log::trace!("flick speed={speed} velocity={}", decay.velocity());
        self.animation = Some(Animation::Kinetic(decay));
    }

    /// Stop any animation. Returns true if one was running.
    pub fn stop(&mut self) -> bool {
        self.animation.take().is_some()
    }

    /// Snap to the top, animated as a single frame, after updating the
    /// lower bound to `lower_bound`.
    pub fn reset_to_top(&mut self, lower_bound: i32) {
        self.dragging = false;
        self.lower_bound = lower_bound.min(0);
        self.clamp();
        self.animation = Some(Animation::Snap(0));
    }

    /// Advance the animation by `dt`. Returns `None` when idle.
    pub fn tick(&mut self, dt: Duration) -> Option<ScrollFrame> {
        let animation = self.animation.as_mut()?;

        let (delta, mut last) = match animation {
            Animation::Kinetic(decay) => decay.step(dt),
            Animation::Snap(target) => (*target - self.offset, true),
        };

        let applied = self.apply(delta);
        // Hitting a bound ends the flick.
        if applied != delta {
            last = true;
        }
        if last {
            self.animation = None;
        }

        Some(ScrollFrame {
            delta: applied,
            last,
        })
    }
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::f32::consts::FRAC_PI_2;

    const FRAME: Duration = Duration::from_millis(16);

    fn run_to_idle(scroll: &mut ScrollController) -> usize {
        let mut frames = 0;
        while scroll.tick(FRAME).is_some() {
            frames += 1;
            assert!(frames < 10_000, "animation never ended");
        }
        frames
    }

    #[test]
    fn test_drag_clamps_to_bounds() {
        let mut scroll = ScrollController::new(-500);

        assert_eq!(scroll.drag(100), 0);
        assert_eq!(scroll.offset(), 0);

        assert_eq!(scroll.drag(-200), -200);
        assert_eq!(scroll.drag(-1000), -300);
        assert_eq!(scroll.offset(), -500);
        assert_eq!(scroll.phase(), ScrollPhase::Dragging);

        scroll.end_drag();
        assert_eq!(scroll.phase(), ScrollPhase::Idle);
    }

    #[test]
    fn test_positive_lower_bound_is_zero() {
        let mut scroll = ScrollController::new(120);
        assert_eq!(scroll.lower_bound(), 0);
        scroll.drag(-50);
        assert_eq!(scroll.offset(), 0);
    }

    #[test]
    fn test_flick_decelerates_to_idle() {
        let mut scroll = ScrollController::new(-100_000);
        scroll.flick(800.0, -FRAC_PI_2);
        assert_eq!(scroll.phase(), ScrollPhase::Animating);

        let first = scroll.tick(FRAME).unwrap();
        let second = scroll.tick(FRAME).unwrap();
        assert!(first.delta < 0);
        assert!(second.delta.abs() <= first.delta.abs() + 1);

        run_to_idle(&mut scroll);
        assert_eq!(scroll.phase(), ScrollPhase::Idle);
        assert!(scroll.offset() < 0);
    }

    #[test]
    fn test_higher_friction_travels_less() {
        let mut low = ScrollController::new(-100_000);
        let mut high = ScrollController::new(-100_000).with_friction(Friction::High);
        low.flick(1000.0, -FRAC_PI_2);
        high.flick(1000.0, -FRAC_PI_2);
        run_to_idle(&mut low);
        run_to_idle(&mut high);

        assert!(high.offset() > low.offset());
    }

    #[test]
    fn test_flick_stops_at_bound() {
        let mut scroll = ScrollController::new(-50);
        scroll.flick(5000.0, -FRAC_PI_2);

        let frames = run_to_idle(&mut scroll);
        assert!(frames < 20);
        assert_eq!(scroll.offset(), -50);
    }

    #[test]
    fn test_drag_during_flick_keeps_offset() {
        let mut scroll = ScrollController::new(-100_000);
        scroll.flick(500.0, -FRAC_PI_2);
        for _ in 0..5 {
            scroll.tick(FRAME);
        }
        let animated = scroll.offset();
        assert!(animated < 0);

        scroll.begin_drag();
        assert_eq!(scroll.phase(), ScrollPhase::Dragging);
        assert_eq!(scroll.offset(), animated);
        assert!(scroll.tick(FRAME).is_none());

        scroll.drag(-10);
        assert_eq!(scroll.offset(), animated - 10);
    }

    #[test]
    fn test_slow_flick_does_not_animate() {
        let mut scroll = ScrollController::new(-1000);
        scroll.flick(10.0, FRAC_PI_2);
        assert_eq!(scroll.phase(), ScrollPhase::Idle);
    }

    #[test]
    fn test_horizontal_flick_does_not_animate() {
        let mut scroll = ScrollController::new(-1000);
        scroll.flick(2000.0, 0.0);
        assert!(!scroll.is_animating());
    }

    #[test]
    fn test_reset_to_top_snaps_in_one_frame() {
        let mut scroll = ScrollController::new(-1000);
        scroll.drag(-400);
        scroll.end_drag();

        scroll.reset_to_top(-300);
        assert_eq!(scroll.phase(), ScrollPhase::Animating);
        assert_eq!(scroll.offset(), -300);

        let frame = scroll.tick(FRAME).unwrap();
        assert_eq!(frame, ScrollFrame { delta: 300, last: true });
        assert_eq!(scroll.offset(), 0);
        assert_eq!(scroll.phase(), ScrollPhase::Idle);
    }

    #[test]
    fn test_shrinking_bound_reclamps() {
        let mut scroll = ScrollController::new(-1000);
        scroll.drag(-900);
        scroll.set_lower_bound(-200);
        assert_eq!(scroll.offset(), -200);
    }

    #[test]
    fn test_offset_always_within_bounds() {
        let mut rng = rand::thread_rng();
        let mut scroll = ScrollController::new(-800);

        for _ in 0..2000 {
            match rng.gen_range(0..8) {
                0 => scroll.begin_drag(),
                1 => {
                    scroll.drag(rng.gen_range(-400..400));
                }
                2 => scroll.end_drag(),
                3 => scroll.flick(rng.gen_range(0.0..3000.0), rng.gen_range(-3.2..3.2)),
                4 => {
                    scroll.tick(Duration::from_millis(rng.gen_range(1..50)));
                }
                5 => scroll.set_lower_bound(rng.gen_range(-2000..200)),
                6 => scroll.reset_to_top(rng.gen_range(-2000..0)),
                _ => {
                    scroll.stop();
                }
            }
            assert!(scroll.lower_bound() <= scroll.offset() && scroll.offset() <= 0);
        }
    }
}
