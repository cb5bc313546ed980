use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::evaluator::EvaluationResult;

pub const CORRECT_POSE_NOTICE: &str = "Great job! Your pose is correct!";
pub const ADJUST_HINT: &str = "Try adjusting your position";

const CORRECT_HOLD: Duration = Duration::from_millis(1000);
const FEEDBACK_HOLD: Duration = Duration::from_millis(2000);

/// Bounded window of timestamped samples.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    data: VecDeque<f32>,
    timestamp: VecDeque<u128>,
    max_length: usize,
}

impl TimeSeries {
    pub fn new(max_length: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(max_length),
            timestamp: VecDeque::with_capacity(max_length),
            max_length,
        }
    }

    pub fn push(&mut self, value: f32, timestamp: u128) {
        self.data.push_back(value);
        self.timestamp.push_back(timestamp);

        if self.data.len() > self.max_length {
            self.data.pop_front();
            self.timestamp.pop_front();
        }
    }

    /// Mean of the window, `None` while it is empty.
    pub fn get_mean(&self) -> Option<f32> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().sum::<f32>() / self.data.len() as f32)
    }

    pub fn latest(&self) -> Option<(f32, u128)> {
        Some((*self.data.back()?, *self.timestamp.back()?))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Feedback,
}

/// A message for the user about the current frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub description: Option<&'static str>,
}

/// Keeps the same notice from being shown again on every frame.
///
/// A notice is held for a while after it is shown (1 s for success, 2 s for
/// corrections); while it is held, an identical notice is swallowed. A
/// different notice replaces it immediately.
#[derive(Debug, Default)]
pub struct FeedbackNotifier {
    current: Option<(Notice, Instant)>,
}

impl FeedbackNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&mut self, result: &EvaluationResult) -> Option<Notice> {
        self.notify_at(result, Instant::now())
    }

    pub fn notify_at(&mut self, result: &EvaluationResult, now: Instant) -> Option<Notice> {
        let notice = if result.is_correct {
            Notice {
                kind: NoticeKind::Success,
                message: CORRECT_POSE_NOTICE.to_string(),
                description: None,
            }
        } else {
            Notice {
                kind: NoticeKind::Feedback,
                message: result.violations.first()?.message.clone(),
                description: Some(ADJUST_HINT),
            }
        };

        if let Some((shown, at)) = &self.current {
            let hold = match shown.kind {
                NoticeKind::Success => CORRECT_HOLD,
                NoticeKind::Feedback => FEEDBACK_HOLD,
            };
            if *shown == notice && now.saturating_duration_since(*at) < hold {
                return None;
            }
        }

        self.current = Some((notice.clone(), now));
        Some(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Violation;

    fn result(messages: &[&str]) -> EvaluationResult {
        EvaluationResult {
            pose: "test".to_string(),
            violations: messages
                .iter()
                .map(|m| Violation {
                    rule_id: m.to_string(),
                    message: m.to_string(),
                })
                .collect(),
            is_correct: messages.is_empty(),
            confidence: 1.0,
            evaluated_rules: Vec::new(),
            skipped_rules: Vec::new(),
        }
    }

    #[test]
    fn time_series_keeps_window() {
        let mut ts = TimeSeries::new(3);
        assert_eq!(ts.get_mean(), None);
        for (i, v) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            ts.push(v, i as u128);
        }
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.get_mean(), Some(3.0));
        assert_eq!(ts.latest(), Some((4.0, 3)));
    }

    #[test]
    fn repeated_feedback_is_held() {
        let mut notifier = FeedbackNotifier::new();
        let start = Instant::now();
        let bad = result(&["Back leg should be straighter.", "Hips"]);

        let first = notifier.notify_at(&bad, start).unwrap();
        assert_eq!(first.kind, NoticeKind::Feedback);
        assert_eq!(first.message, "Back leg should be straighter.");
        assert_eq!(first.description, Some(ADJUST_HINT));

        assert_eq!(notifier.notify_at(&bad, start + Duration::from_millis(500)), None);
        assert!(notifier
            .notify_at(&bad, start + Duration::from_millis(2100))
            .is_some());
    }

    #[test]
    fn different_notice_replaces_current() {
        let mut notifier = FeedbackNotifier::new();
        let start = Instant::now();
        notifier.notify_at(&result(&["Hips"]), start).unwrap();

        let ok = notifier
            .notify_at(&result(&[]), start + Duration::from_millis(10))
            .unwrap();
        assert_eq!(ok.kind, NoticeKind::Success);
        assert_eq!(ok.message, CORRECT_POSE_NOTICE);

        assert_eq!(
            notifier.notify_at(&result(&[]), start + Duration::from_millis(900)),
            None
        );
        assert!(notifier
            .notify_at(&result(&[]), start + Duration::from_millis(1200))
            .is_some());
    }
}
