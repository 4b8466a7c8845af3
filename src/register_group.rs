use crate::register::AttributeDef;

use serde::Serialize;

/// Registers further than this from the start of the current group open a new
/// one. Keeps each request well inside the 125-word Modbus limit.
pub const GAP_THRESHOLD: i32 = 100;

/// Start used for the group of host-computed attributes.
pub const COMPUTED_GROUP_START: i32 = -1;

/// A contiguous span of input registers fetched with one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadGroup {
    pub start: i32,
    pub length: u16,
    pub members: Vec<AttributeDef>,
}

impl ReadGroup {
    fn starting_at(attribute: &AttributeDef) -> Self {
        Self {
            start: attribute.offset,
            length: attribute.encoding.words(),
            members: vec![attribute.clone()],
        }
    }

    fn end(&self) -> i32 {
        self.start + self.length as i32
    }

    fn accepts(&self, attribute: &AttributeDef) -> bool {
        // an attribute overlapping the span must join it, or the reads would overlap
        attribute.offset - self.start < GAP_THRESHOLD || attribute.offset < self.end()
    }

    fn push(&mut self, attribute: &AttributeDef) {
        let end = (attribute.offset - self.start) as u16 + attribute.encoding.words();
        self.length = self.length.max(end);
        self.members.push(attribute.clone());
    }

    /// True for the group that never touches the bus.
    pub fn is_computed(&self) -> bool {
        self.start < 0
    }

    /// First register of the span, `None` for the computed group.
    pub fn address(&self) -> Option<u16> {
        u16::try_from(self.start).ok()
    }

    /// Position of `attribute` within the words returned for this group.
    pub fn index_of(&self, attribute: &AttributeDef) -> usize {
        (attribute.offset - self.start) as usize
    }
}

/// Coalesce attributes into read groups, ordered by start register.
///
/// Hardware attributes are sorted by offset and appended to the current group
/// until one lies `GAP_THRESHOLD` or more words past the group's start and
/// clear of its span. Any computed attributes end up together in one trailing
/// group of length zero.
pub fn group(attributes: &[AttributeDef]) -> Vec<ReadGroup> {
    let mut sorted: Vec<&AttributeDef> = attributes.iter().collect();
    sorted.sort_by_key(|a| a.offset);

    let (computed, hardware): (Vec<&AttributeDef>, Vec<&AttributeDef>) =
        sorted.into_iter().partition(|a| a.is_computed());

    let mut groups: Vec<ReadGroup> = Vec::new();
    for attribute in hardware {
        match groups.last_mut() {
            Some(current) if current.accepts(attribute) => current.push(attribute),
            _ => groups.push(ReadGroup::starting_at(attribute)),
        }
    }

    if !computed.is_empty() {
        groups.push(ReadGroup {
            start: COMPUTED_GROUP_START,
            length: 0,
            members: computed.into_iter().cloned().collect(),
        });
    }

    groups
}
