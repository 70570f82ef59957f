//! Per-backend stack of resource frames.

/// LIFO stack of resources for one backend on one thread.
///
/// A frame is popped only by the call that pushed it. Popping or replacing on
/// an empty stack means that bookkeeping is broken and panics.
#[derive(Debug)]
pub struct ResourceContextStack<R> {
    frames: Vec<R>,
}

impl<R> ResourceContextStack<R> {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn current_or_none(&self) -> Option<&R> {
        self.frames.last()
    }

    pub fn push(&mut self, resource: R) {
        self.frames.push(resource);
    }

    pub fn pop(&mut self) -> R {
        match self.frames.pop() {
            Some(resource) => resource,
            None => panic!("pop on an empty resource context stack"),
        }
    }

    /// Swap the top frame's resource, returning the previous one.
    pub fn replace_top(&mut self, resource: R) -> R {
        match self.frames.last_mut() {
            Some(top) => std::mem::replace(top, resource),
            None => panic!("replace_top on an empty resource context stack"),
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl<R> Default for ResourceContextStack<R> {
    fn default() -> Self {
        Self::new()
    }
}
