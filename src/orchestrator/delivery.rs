use tracing::{debug, warn};

use super::notices;
use crate::store::types::ConversationId;
use crate::transport::{MessageFormat, Transport};

/// What reached the transport during one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

/// Send answer segments in order, one transport call each, then the disclaimer.
///
/// A failed segment is logged and skipped; the rest are still sent.
pub async fn deliver(
    transport: &dyn Transport,
    conversation: ConversationId,
    segments: &[String],
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for (index, segment) in segments.iter().enumerate() {
        match transport
            .send_message(conversation, segment, MessageFormat::Markdown)
            .await
        {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.failed += 1;
                warn!(conversation, index, "Failed to deliver segment: {:#}", e);
            }
        }
    }

    if let Err(e) = transport
        .send_message(conversation, notices::BOT_MAKES_MISTAKES, MessageFormat::Plain)
        .await
    {
        warn!(conversation, "Failed to deliver disclaimer: {:#}", e);
    }

    debug!(conversation, sent = report.sent, failed = report.failed, "delivery finished");
    report
}
