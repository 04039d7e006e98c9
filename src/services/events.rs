use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::core::redis::RedisHandle;
use crate::db::types::AppealStatus;

/// Notifications the grading core hands to delivery channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GradingEvent {
    GradeCreated {
        submission_id: String,
        grade_id: String,
        score: Option<f64>,
        grader_id: String,
    },
    GradeOverridden {
        submission_id: String,
        old_score: Option<f64>,
        new_score: f64,
        reason: String,
        instructor_id: String,
    },
    GradesReleased {
        submission_ids: Vec<String>,
        performer_id: String,
    },
    GradeReturnedToQueue {
        submission_id: String,
        performer_id: String,
    },
    AppealSubmitted {
        appeal_id: String,
        submission_id: String,
        student_id: String,
        /// The assignment creator.
        recipient_id: String,
    },
    AppealDecided {
        appeal_id: String,
        submission_id: String,
        student_id: String,
        status: AppealStatus,
        reviewer_id: String,
    },
}

impl GradingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GradingEvent::GradeCreated { .. } => "grade_created",
            GradingEvent::GradeOverridden { .. } => "grade_overridden",
            GradingEvent::GradesReleased { .. } => "grades_released",
            GradingEvent::GradeReturnedToQueue { .. } => "grade_returned_to_queue",
            GradingEvent::AppealSubmitted { .. } => "appeal_submitted",
            GradingEvent::AppealDecided { .. } => "appeal_decided",
        }
    }
}

/// Outbound event channel. `emit` never blocks on delivery.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GradingEvent);
}

/// Writes events to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: GradingEvent) {
        tracing::info!(event = event.name(), payload = ?event, "Grading event");
    }
}

/// Publishes events as JSON on a Redis pub/sub channel.
#[derive(Clone)]
pub struct RedisEventPublisher {
    redis: RedisHandle,
    channel: String,
}

impl RedisEventPublisher {
    pub fn new(redis: RedisHandle, channel: impl Into<String>) -> Self {
        Self { redis, channel: channel.into() }
    }
}

impl EventSink for RedisEventPublisher {
    fn emit(&self, event: GradingEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(event = event.name(), error = %err, "Failed to encode grading event");
                return;
            }
        };

        let redis = self.redis.clone();
        let channel = self.channel.clone();
        let name = event.name();
        tokio::spawn(async move {
            if let Err(err) = redis.publish(&channel, &payload).await {
                tracing::warn!(event = name, channel, error = %err, "Failed to publish grading event");
            }
        });
    }
}

/// Keeps every emitted event in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<GradingEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GradingEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: GradingEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = GradingEvent::GradeOverridden {
            submission_id: "s-1".into(),
            old_score: Some(70.0),
            new_score: 85.0,
            reason: "clerical error".into(),
            instructor_id: "t-1".into(),
        };
        let value = serde_json::to_value(&event).expect("json");
        assert_eq!(value["type"], "grade_overridden");
        assert_eq!(value["data"]["old_score"], 70.0);
        assert_eq!(value["data"]["new_score"], 85.0);
        assert_eq!(event.name(), "grade_overridden");
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.emit(GradingEvent::GradeReturnedToQueue {
            submission_id: "a".into(),
            performer_id: "t".into(),
        });
        sink.emit(GradingEvent::GradesReleased {
            submission_ids: vec!["a".into()],
            performer_id: "t".into(),
        });

        let names: Vec<_> = sink.events().iter().map(GradingEvent::name).collect();
        assert_eq!(names, ["grade_returned_to_queue", "grades_released"]);
    }
}
