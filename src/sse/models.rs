use crate::db::models::PollStatus;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct VoteCast {
    pub poll_id: Uuid,
    pub vote_id: Uuid,
}

#[derive(Debug, Clone)]
pub enum SseEvent {
    VoteCast(VoteCast),
    PollCreated { poll_id: Uuid, title: String },
    StatusChanged { poll_id: Uuid, status: PollStatus },
}

pub type SseSender = tokio::sync::broadcast::Sender<SseEvent>;

/// Event name pushed to subscribers when a poll changes status:
/// terminal states (ENDED, CANCELLED) close the poll, anything else is
/// an ordinary update.
pub fn status_event_name(status: PollStatus) -> &'static str {
    if status.is_terminal() {
        "poll_ended"
    } else {
        "poll_updated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_emit_poll_ended() {
        assert_eq!(status_event_name(PollStatus::Ended), "poll_ended");
        assert_eq!(status_event_name(PollStatus::Cancelled), "poll_ended");
    }

    #[test]
    fn activation_emits_poll_updated() {
        assert_eq!(status_event_name(PollStatus::Active), "poll_updated");
        assert_eq!(status_event_name(PollStatus::Pending), "poll_updated");
    }
}
