//! Pooled scratch buffers for encode-time index selection.

use core::cell::RefCell;
use core::ops::{Deref, DerefMut};

thread_local! {
    static POOL: RefCell<Vec<Vec<u32>>> = const { RefCell::new(Vec::new()) };
}

/// A pooled `Vec<u32>` returned to the pool when dropped.
///
/// Returning on drop covers every exit path, including early returns and
/// cancellation unwinds.
pub(crate) struct ScratchIndexes {
    buf: Vec<u32>,
}

impl ScratchIndexes {
    pub fn acquire() -> Self {
        let buf = POOL
            .with(|pool| pool.borrow_mut().pop())
            .unwrap_or_default();
        Self { buf }
    }
}

impl Deref for ScratchIndexes {
    type Target = Vec<u32>;

    fn deref(&self) -> &Vec<u32> {
        &self.buf
    }
}

impl DerefMut for ScratchIndexes {
    fn deref_mut(&mut self) -> &mut Vec<u32> {
        &mut self.buf
    }
}

impl Drop for ScratchIndexes {
    fn drop(&mut self) {
        let mut buf = core::mem::take(&mut self.buf);
        buf.clear();
        POOL.with(|pool| pool.borrow_mut().push(buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_reused() {
        let ptr = {
            let mut scratch = ScratchIndexes::acquire();
            scratch.push(7);
            scratch.as_ptr()
        };
        let scratch = ScratchIndexes::acquire();
        assert!(scratch.is_empty());
        assert_eq!(scratch.as_ptr(), ptr);
    }
}
