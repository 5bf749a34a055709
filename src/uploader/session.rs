//! Per-file upload session state

use peertube_api::models::video::ContentRange;

/// State of one resumable upload, owned by a single worker
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Absolute chunk endpoint returned by the init call
    pub upload_location: String,
    pub total_bytes: u64,
    /// Bytes the server has acknowledged; never decreases
    cursor: u64,
    retries_left: u32,
    max_retries: u32,
}

impl UploadSession {
    pub fn new(upload_location: String, total_bytes: u64, max_retries: u32) -> Self {
        Self {
            upload_location,
            total_bytes,
            cursor: 0,
            retries_left: max_retries,
            max_retries,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `Content-Range` for a chunk of `length` bytes at the cursor
    pub fn range_for(&self, length: u64) -> ContentRange {
        ContentRange::new(self.cursor, length, self.total_bytes)
    }

    /// Record that the server stored `length` more bytes
    pub fn acknowledge(&mut self, length: u64) {
        self.cursor += length;
    }

    /// Spend one retry; false when the budget is already exhausted
    pub fn consume_retry(&mut self) -> bool {
        if self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_advances_with_acknowledged_chunks() {
        let mut session = UploadSession::new("http://h/u".to_string(), 10, 2);
        assert_eq!(session.range_for(4).to_string(), "bytes 0-3/10");

        session.acknowledge(4);
        session.acknowledge(4);
        assert_eq!(session.range_for(2).to_string(), "bytes 8-9/10");

        session.acknowledge(2);
        assert_eq!(session.cursor(), session.total_bytes);
    }

    #[test]
    fn test_retry_budget_is_shared_across_chunks() {
        let mut session = UploadSession::new("http://h/u".to_string(), 10, 2);
        assert!(session.consume_retry());
        session.acknowledge(4);
        assert!(session.consume_retry());
        assert!(!session.consume_retry());
        assert_eq!(session.retries_left(), 0);
        assert_eq!(session.max_retries(), 2);
    }
}
