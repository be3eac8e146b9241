pub(crate) mod backend;
#[cfg(test)]
pub(crate) mod fake;
pub(crate) mod observer;
pub(crate) mod orchestrator;
pub(crate) mod paths;
