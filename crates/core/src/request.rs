//! Request identifier allocation.

use callbridge_types::RequestId;

/// Hands out request identifiers for one execution context.
///
/// The correlator keeps a map of `RequestId` -> pending result. An
/// identifier is only reused after the counter wraps, and even then any
/// identifier still present in that map is skipped.
///
/// # Example
///
/// ```ignore
/// let request_id = self.allocator.allocate(|id| self.pending.contains_key(&id));
/// self.pending.insert(request_id, PendingRequest::new(...));
///
/// // Later, when the terminal callback for `request_id` arrives:
/// if let Some(entry) = self.pending.swap_remove(&request_id) {
///     entry.future.resolve(buffer);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequestIdAllocator {
    next: RequestId,
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdAllocator {
    /// Create an allocator starting at [`RequestId::FIRST`].
    pub fn new() -> Self {
        Self {
            next: RequestId::FIRST,
        }
    }

    /// Create an allocator whose next identifier is `next`.
    ///
    /// Zero is not a valid identifier and is bumped to [`RequestId::FIRST`].
    pub fn starting_at(next: RequestId) -> Self {
        Self {
            next: if next.0 == 0 { RequestId::FIRST } else { next },
        }
    }

    /// Allocate the next identifier that `in_use` does not claim.
    pub fn allocate(&mut self, in_use: impl Fn(RequestId) -> bool) -> RequestId {
        loop {
            let candidate = self.next;
            self.next = candidate.next();
            if !in_use(candidate) {
                return candidate;
            }
        }
    }

    /// Peek at the identifier the next allocation starts from.
    pub fn peek(&self) -> RequestId {
        self.next
    }
}
