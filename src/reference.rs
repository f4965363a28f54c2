//! Reference resolution for ordered entity collections.
//!
//! A reference is a user-supplied token that names one entity in a
//! collection by its zero-based position, its alias, its label or its id.
//! The collection is scanned in order and the first entity matching on any
//! of these wins. Aliases and labels are not required to be unique, so an
//! ambiguous token resolves to the earliest inserted entity.

use uuid::Uuid;

/// An entity that can be looked up by reference.
pub trait Referable {
    fn id(&self) -> Uuid;
    fn alias(&self) -> Option<&str>;
    fn label(&self) -> Option<&str>;

    fn matches_ref(&self, position: usize, token: &str) -> bool {
        if token.parse::<usize>().ok() == Some(position) {
            return true;
        }
        if self.alias() == Some(token) || self.label() == Some(token) {
            return true;
        }
        Uuid::parse_str(token).map_or(false, |id| id == self.id())
    }
}

/// Position of the first entity matching `token`.
pub fn position_by_ref<T: Referable>(items: &[T], token: &str) -> Option<usize> {
    items
        .iter()
        .enumerate()
        .position(|(seq, item)| item.matches_ref(seq, token))
}

/// First entity matching `token`, if any.
pub fn find_by_ref<'a, T: Referable>(items: &'a [T], token: &str) -> Option<&'a T> {
    position_by_ref(items, token).map(|seq| &items[seq])
}

pub fn find_by_ref_mut<'a, T: Referable>(items: &'a mut [T], token: &str) -> Option<&'a mut T> {
    position_by_ref(items, token).map(move |seq| &mut items[seq])
}
