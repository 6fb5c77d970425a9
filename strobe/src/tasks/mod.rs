pub(crate) mod coordinator;
pub(crate) mod input;
pub(crate) mod tracker;
