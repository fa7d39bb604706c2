//! This module holds policies, which are entities that allow configuring
//! the pool's behaviour. Users can implement a policy on their own by
//! implementing the corresponding trait.
//!
//! This includes:
//! - [host selection](host_selection) - which nodes to try, in which order, for a request,
//! - [connection selection](conn_selection) - which connection to a chosen node to use.

pub mod conn_selection;
pub mod host_selection;

// Rotates `slice` left by `index` modulo its length.
pub(crate) fn rotated<T: Clone>(slice: &[T], index: usize) -> impl Iterator<Item = T> + '_ {
    let mid = if slice.is_empty() { 0 } else { index % slice.len() };
    let (end, begin) = slice.split_at(mid);
    begin.iter().chain(end.iter()).cloned()
}
