use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IdGenerator {
    pub current_id: usize,
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self { current_id: 0 }
    }

    pub fn next_id(&mut self) -> usize {
        let id = self.current_id;
        self.current_id += 1;
        id
    }

    pub fn next_frame_id(&mut self) -> FrameId {
        FrameId(self.next_id())
    }
}

/// Handle to an open frame, returned by the `open_*` calls and used to close it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub(crate) usize);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
