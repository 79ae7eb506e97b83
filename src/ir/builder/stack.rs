use tracing::trace;

use crate::ir::BuildOutput;

use super::{
    common::{FrameId, IdGenerator},
    errors::{BuildError, IntegrityError},
    frames::{Frame, FrameKind, FrameVariant, SeqExprFrame},
};

#[derive(Debug)]
struct Entry {
    id: FrameId,
    frame: Frame,
}

/// The active frames of a build session, plus its result slot.
#[derive(Debug, Default)]
pub struct FrameStack {
    entries: Vec<Entry>,
    result: Option<BuildOutput>,
    ids: IdGenerator,
}

impl FrameStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) -> FrameId {
        let id = self.ids.next_frame_id();
        trace!(%id, kind = %frame.kind(), depth = self.entries.len(), "push frame");
        self.entries.push(Entry { id, frame });
        id
    }

    /// Pops the last frame, which must be the frame `id`.
    pub fn pop(&mut self, id: FrameId) -> Result<Frame, IntegrityError> {
        let found = self.top_id();
        if found != Some(id) {
            return Err(IntegrityError::PopMismatch {
                expected: id,
                found,
            });
        }
        let entry = self
            .entries
            .pop()
            .ok_or(IntegrityError::PopMismatch { expected: id, found })?;
        trace!(%id, kind = %entry.frame.kind(), "pop frame");
        Ok(entry.frame)
    }

    /// Pops the frame `id` as a `K` frame.
    pub fn pop_as<K: FrameVariant>(&mut self, id: FrameId) -> Result<K, IntegrityError> {
        K::from_frame(self.pop(id)?).map_err(|frame| IntegrityError::KindMismatch {
            id,
            expected: K::KIND,
            found: frame.kind(),
        })
    }

    pub fn top_id(&self) -> Option<FrameId> {
        self.entries.last().map(|entry| entry.id)
    }

    pub fn last(&self) -> Option<&Frame> {
        self.entries.last().map(|entry| &entry.frame)
    }

    pub fn last_mut(&mut self) -> Option<&mut Frame> {
        self.entries.last_mut().map(|entry| &mut entry.frame)
    }

    /// The last frame, only if it's a `K` frame.
    pub fn top<K: FrameVariant>(&self) -> Option<&K> {
        self.last().and_then(K::cast)
    }

    /// The closest `K` frame, scanning from the last frame to the first.
    pub fn nearest<K: FrameVariant>(&self) -> Option<&K> {
        self.entries.iter().rev().find_map(|entry| K::cast(&entry.frame))
    }

    pub fn nearest_mut<K: FrameVariant>(&mut self) -> Option<&mut K> {
        self.entries
            .iter_mut()
            .rev()
            .find_map(|entry| K::cast_mut(&mut entry.frame))
    }

    /// The last frame, only if it's a function, then or else frame.
    pub fn top_seq_mut(&mut self) -> Option<(FrameKind, &mut SeqExprFrame)> {
        let entry = self.entries.last_mut()?;
        let kind = entry.frame.kind();
        entry.frame.as_seq_mut().map(|seq| (kind, seq))
    }

    /// The id of the frame right below the last one.
    pub fn id_below_top(&self) -> Option<FrameId> {
        self.entries
            .len()
            .checked_sub(2)
            .map(|index| self.entries[index].id)
    }

    /// The frames, from the first to the last.
    pub fn frames_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Frame> {
        self.entries.iter_mut().map(|entry| &mut entry.frame)
    }

    /// Whether any `K` frame sits above the frame `id`.
    pub fn any_above<K: FrameVariant>(&self, id: FrameId) -> bool {
        self.entries
            .iter()
            .rev()
            .take_while(|entry| entry.id != id)
            .any(|entry| K::cast(&entry.frame).is_some())
    }

    /// Whether a dataflow block is open anywhere on the stack.
    pub fn in_dataflow_block(&self) -> bool {
        self.entries.iter().any(|entry| entry.frame.is_dataflow_block())
    }

    pub fn kind_of(&self, id: FrameId) -> Option<FrameKind> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.frame.kind())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The frame kinds, from the first frame to the last.
    pub fn kinds(&self) -> Vec<FrameKind> {
        self.entries.iter().map(|entry| entry.frame.kind()).collect()
    }

    pub fn set_result(&mut self, value: BuildOutput) -> Result<(), BuildError> {
        if self.result.is_some() {
            return Err(BuildError::DuplicateResult);
        }
        self.result = Some(value);
        Ok(())
    }

    pub fn result(&self) -> Option<&BuildOutput> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<BuildOutput> {
        self.result.take()
    }
}
