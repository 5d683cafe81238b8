use crate::Result;
use std::fmt;

/// Common behavior of every kind of rule loaded into a rule manager.
pub trait GuardRule: fmt::Debug + Send + Sync {
    fn resource_name(&self) -> String;
    /// Rules failing validation are skipped on load.
    fn is_valid(&self) -> Result<()> {
        Ok(())
    }
}
