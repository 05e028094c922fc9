use crate::AttachmentId;
use std::sync::atomic::{AtomicU32, Ordering};

// Process-global so attachments from different skeletons never share an identity.
static NEXT_ATTACHMENT_ID: AtomicU32 = AtomicU32::new(0);

pub(crate) fn next_attachment_id() -> AttachmentId {
    AttachmentId(NEXT_ATTACHMENT_ID.fetch_add(1, Ordering::Relaxed))
}
