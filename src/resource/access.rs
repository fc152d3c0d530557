// src/resource/access.rs

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Identity of a logical resource. Allocated by
/// [`ResourceRegistry`](crate::resource::ResourceRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u64);

/// Half-open element range of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl From<Range<usize>> for Span {
    fn from(r: Range<usize>) -> Self {
        Span {
            start: r.start,
            end: r.end,
        }
    }
}

/// A named logical entity tasks declare access to: a buffer, a field, a
/// transport slot.
///
/// A resource may be narrowed to a [`Span`] of elements. Spans of the same
/// resource only overlap when their ranges intersect; the unsliced resource
/// overlaps every slice of itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    id: ResourceId,
    name: Arc<str>,
    span: Option<Span>,
}

impl Resource {
    pub(crate) fn new(id: ResourceId, name: Arc<str>) -> Self {
        Self {
            id,
            name,
            span: None,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    /// The same resource restricted to `range`.
    ///
    /// Slicing an already sliced resource is relative to the existing span.
    pub fn slice(&self, range: Range<usize>) -> Resource {
        let span = match self.span {
            Some(outer) => Span {
                start: outer.start + range.start,
                end: (outer.start + range.end).min(outer.end),
            },
            None => Span::from(range),
        };
        Resource {
            id: self.id,
            name: Arc::clone(&self.name),
            span: Some(span),
        }
    }

    /// Whether two handles may refer to the same elements.
    pub fn overlaps(&self, other: &Resource) -> bool {
        if self.id != other.id {
            return false;
        }
        match (self.span, other.span) {
            (Some(a), Some(b)) => a.overlaps(&b),
            _ => true,
        }
    }

    /// Whether every element of `other` is also an element of `self`.
    pub fn covers(&self, other: &Resource) -> bool {
        if self.id != other.id {
            return false;
        }
        match (self.span, other.span) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a.contains(&b),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(s) => write!(f, "{}#{}[{}..{}]", self.name, self.id.0, s.start, s.end),
            None => write!(f, "{}#{}", self.name, self.id.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn is_write(self) -> bool {
        !matches!(self, AccessMode::Read)
    }

    /// Whether holding `self` entitles a child to `other`.
    pub fn covers(self, other: AccessMode) -> bool {
        self.is_write() || other == AccessMode::Read
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => f.write_str("read"),
            AccessMode::Write => f.write_str("write"),
            AccessMode::ReadWrite => f.write_str("readwrite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Access {
    pub resource: Resource,
    pub mode: AccessMode,
}

impl Access {
    pub fn read(resource: &Resource) -> Self {
        Self {
            resource: resource.clone(),
            mode: AccessMode::Read,
        }
    }

    pub fn write(resource: &Resource) -> Self {
        Self {
            resource: resource.clone(),
            mode: AccessMode::Write,
        }
    }

    pub fn read_write(resource: &Resource) -> Self {
        Self {
            resource: resource.clone(),
            mode: AccessMode::ReadWrite,
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.resource)
    }
}

/// The full set of accesses a task declares. Immutable once the task is
/// created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSet {
    accesses: Vec<Access>,
}

impl AccessSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, access: Access) {
        self.accesses.push(access);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Access> {
        self.accesses.iter()
    }

    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }
}

impl FromIterator<Access> for AccessSet {
    fn from_iter<I: IntoIterator<Item = Access>>(iter: I) -> Self {
        Self {
            accesses: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for AccessSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.accesses.is_empty() {
            return f.write_str("  (none)");
        }
        for (i, access) in self.accesses.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {access}")?;
        }
        Ok(())
    }
}
