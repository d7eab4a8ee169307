//! Pre-round countdown state machine

use std::time::Duration;

/// Value the countdown starts from
pub const COUNTDOWN_FROM: u32 = 3;
/// Delay between countdown steps
pub const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Countdown phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    /// No countdown pending
    Idle,
    /// Counting, holding the value last shown
    Counting(u32),
    /// Countdown reached zero and the round was started
    Fired,
}

/// Result of advancing the countdown by one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// Show this value to the room
    Show(u32),
    /// Countdown is over, start the round
    Fire,
    /// Nothing left to do
    Done,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    state: CountdownState,
    from: u32,
}

impl Countdown {
    pub fn new(from: u32) -> Self {
        Self {
            state: CountdownState::Idle,
            from,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == CountdownState::Idle
    }

    /// Advance one step. The first step from `Idle` shows the full value.
    pub fn step(&mut self) -> CountdownStep {
        match self.state {
            CountdownState::Idle => {
                self.state = CountdownState::Counting(self.from);
                CountdownStep::Show(self.from)
            }
            CountdownState::Counting(n) if n > 1 => {
                self.state = CountdownState::Counting(n - 1);
                CountdownStep::Show(n - 1)
            }
            CountdownState::Counting(_) => {
                self.state = CountdownState::Fired;
                CountdownStep::Fire
            }
            CountdownState::Fired => CountdownStep::Done,
        }
    }

    /// Return to `Idle` so the next room fill can count again
    pub fn reset(&mut self) {
        self.state = CountdownState::Idle;
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(COUNTDOWN_FROM)
    }
}
