use super::{DefaultNode, EntranceNode, TreeNode};
use crate::base::OUT_OF_ORDER_EXIT_ERROR;
use crate::{Error, Result};
use std::fmt;
use std::sync::{Arc, Mutex};

struct Frame {
    entry_id: u64,
    /// absent under the null context
    node: Option<Arc<DefaultNode>>,
}

/// Context is the handle of one logical call chain.
/// It links the entrance node of its name to the nodes of the entries
/// currently active in it, the top of the stack being the current entry.
pub struct Context {
    name: String,
    origin: String,
    is_async: bool,
    /// absent for the null context
    entrance_node: Option<Arc<EntranceNode>>,
    /// the node new entries are attached to when the stack is empty,
    /// set on async contexts
    parent_node: Option<Arc<dyn TreeNode>>,
    stack: Mutex<Vec<Frame>>,
}

impl Context {
    pub(crate) fn new(name: String, origin: String, entrance_node: Option<Arc<EntranceNode>>) -> Self {
        Context {
            name,
            origin,
            is_async: false,
            entrance_node,
            parent_node: None,
            stack: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Entries of the null context skip every rule and record nothing.
    pub fn is_null(&self) -> bool {
        self.entrance_node.is_none()
    }

    pub fn entrance_node(&self) -> Option<Arc<EntranceNode>> {
        self.entrance_node.clone()
    }

    /// The node the next entry becomes a child of.
    pub fn current_node(&self) -> Option<Arc<dyn TreeNode>> {
        let top = self
            .stack
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|f| f.node.clone());
        match top {
            Some(node) => Some(node as Arc<dyn TreeNode>),
            None => self.parent_node.clone().or_else(|| {
                self.entrance_node
                    .clone()
                    .map(|n| n as Arc<dyn TreeNode>)
            }),
        }
    }

    /// Id of the current entry.
    pub fn current_entry(&self) -> Option<u64> {
        self.stack.lock().unwrap().last().map(|f| f.entry_id)
    }

    /// Amount of active entries.
    pub fn depth(&self) -> usize {
        self.stack.lock().unwrap().len()
    }

    pub fn is_idle(&self) -> bool {
        self.depth() == 0
    }

    /// Forks a context for work handed to another task or thread.
    /// It shares the entrance and origin of `self`, and its first entries
    /// become children of the current node of `self`.
    pub fn new_async_context(&self) -> Arc<Context> {
        Arc::new(Context {
            name: self.name.clone(),
            origin: self.origin.clone(),
            is_async: true,
            entrance_node: self.entrance_node.clone(),
            parent_node: self.current_node(),
            stack: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn push_entry(&self, entry_id: u64, node: Option<Arc<DefaultNode>>) {
        self.stack.lock().unwrap().push(Frame { entry_id, node });
    }

    /// Removes the entry from the stack, failing if it was not the current one.
    pub(crate) fn pop_entry(&self, entry_id: u64) -> Result<()> {
        let mut stack = self.stack.lock().unwrap();
        match stack.iter().rposition(|f| f.entry_id == entry_id) {
            Some(pos) => {
                let is_top = pos + 1 == stack.len();
                stack.remove(pos);
                if is_top {
                    Ok(())
                } else {
                    Err(Error::msg(OUT_OF_ORDER_EXIT_ERROR))
                }
            }
            None => Err(Error::msg(OUT_OF_ORDER_EXIT_ERROR)),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("is_async", &self.is_async)
            .field("is_null", &self.is_null())
            .field("depth", &self.depth())
            .finish()
    }
}
