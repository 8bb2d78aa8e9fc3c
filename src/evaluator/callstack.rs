use crate::value::{Procedure, Value};
use std::rc::Rc;

/// One pending user-procedure invocation
#[derive(Clone)]
pub(crate) struct Frame {
    pub(crate) proc: Rc<Procedure>,
    pub(crate) args: Vec<Value>,
    /// Set when a tail call rewrote this frame during the current body run
    pub(crate) modified: bool,
    /// Whether the expression currently evaluating is the final one of its body
    pub(crate) last: bool,
}

/// Explicit stack of live procedure frames driving tail-call elimination.
///
/// Every accessor that needs a frame returns `Option` instead of panicking;
/// the evaluator only touches the top frame while a procedure body is running.
#[derive(Default)]
pub(crate) struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub(crate) fn new() -> Self {
        CallStack::default()
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push(&mut self, proc: Rc<Procedure>, args: Vec<Value>) {
        self.frames.push(Frame {
            proc,
            args,
            modified: false,
            last: false,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub(crate) fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Replace the running invocation with a tail call.
    ///
    /// Returns the call back if there is no frame to rewrite.
    pub(crate) fn rewrite(
        &mut self,
        proc: Rc<Procedure>,
        args: Vec<Value>,
    ) -> Result<(), (Rc<Procedure>, Vec<Value>)> {
        match self.frames.last_mut() {
            Some(frame) => {
                *frame = Frame {
                    proc,
                    args,
                    modified: true,
                    last: false,
                };
                Ok(())
            }
            None => Err((proc, args)),
        }
    }

    /// Take the pending tail call out of the top frame, if one was recorded.
    /// Clears the `modified` mark so the next body run starts clean.
    pub(crate) fn take_rewrite(&mut self) -> Option<(Rc<Procedure>, Vec<Value>)> {
        let frame = self.frames.last_mut()?;
        if !frame.modified {
            return None;
        }
        frame.modified = false;
        Some((Rc::clone(&frame.proc), std::mem::take(&mut frame.args)))
    }

    pub(crate) fn is_last(&self) -> bool {
        self.top().is_some_and(|frame| frame.last)
    }

    /// Mark whether the top frame is evaluating its final expression.
    /// Returns the previous mark, or None on an empty stack.
    pub(crate) fn set_last(&mut self, last: bool) -> Option<bool> {
        self.frames
            .last_mut()
            .map(|frame| std::mem::replace(&mut frame.last, last))
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}
