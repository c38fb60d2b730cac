use crate::state::{ProgressPhase, ProgressSnapshot};

/// Decides which progress updates are worth re-broadcasting to pages.
///
/// An update goes out when the phase changes, when the percent moved by at
/// least `step` since the last broadcast, or when it reaches 100.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    step: u8,
    last: Option<ProgressSnapshot>,
}

impl ProgressThrottle {
    pub fn new(step: u8) -> Self {
        Self {
            step: step.max(1),
            last: None,
        }
    }

    pub fn should_broadcast(&mut self, snapshot: ProgressSnapshot) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => {
                snapshot.phase != last.phase
                    || snapshot.phase == ProgressPhase::Testing
                    || snapshot.percent >= 100
                    || snapshot.percent.abs_diff(last.percent) >= self.step
            }
        };
        if due {
            self.last = Some(snapshot);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloading(percent: u8) -> ProgressSnapshot {
        ProgressSnapshot {
            percent,
            phase: ProgressPhase::Downloading,
        }
    }

    #[test]
    fn small_steps_are_suppressed() {
        let mut throttle = ProgressThrottle::new(5);
        assert!(throttle.should_broadcast(downloading(0)));
        assert!(!throttle.should_broadcast(downloading(3)));
        assert!(!throttle.should_broadcast(downloading(4)));
        assert!(throttle.should_broadcast(downloading(5)));
        assert!(!throttle.should_broadcast(downloading(9)));
        assert!(throttle.should_broadcast(downloading(12)));
    }

    #[test]
    fn completion_and_testing_always_pass() {
        let mut throttle = ProgressThrottle::new(5);
        assert!(throttle.should_broadcast(downloading(97)));
        assert!(throttle.should_broadcast(downloading(100)));
        assert!(throttle.should_broadcast(ProgressSnapshot {
            percent: 100,
            phase: ProgressPhase::Testing,
        }));
    }

    #[test]
    fn reset_lets_next_update_through() {
        let mut throttle = ProgressThrottle::new(5);
        assert!(throttle.should_broadcast(downloading(40)));
        throttle.reset();
        assert!(throttle.should_broadcast(downloading(41)));
    }
}
