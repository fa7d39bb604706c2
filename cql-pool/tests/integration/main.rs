mod custom_policies;
mod topology;
pub(crate) mod utils;
