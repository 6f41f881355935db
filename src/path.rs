//! sd-mmc-card - Paths on the card
//!
//! Paths are always relative to the mount point. A leading `/` is optional,
//! repeated separators and `.` segments are dropped, and the result is
//! stored as `/a/b/c`.

use alloc::string::String;
use core::fmt;

/// Longest name FAT long file names allow.
pub const MAX_SEGMENT_LEN: usize = 255;

/// A path could not be normalized.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PathError {
    /// `..` is not supported.
    ParentSegment,
    /// Character FAT does not allow in a name.
    InvalidChar(char),
    /// A single name was longer than [`MAX_SEGMENT_LEN`].
    SegmentTooLong,
}

/// A normalized path below the mount point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SdPath {
    inner: String,
}

impl SdPath {
    const SEPARATOR: char = '/';
    const FORBIDDEN: &'static [char] = &['"', '*', ':', '<', '>', '?', '\\', '|'];

    pub fn new(path: &str) -> Result<SdPath, PathError> {
        let mut inner = String::with_capacity(path.len() + 1);
        for segment in path.split(Self::SEPARATOR) {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathError::ParentSegment),
                _ => {}
            }
            if segment.len() > MAX_SEGMENT_LEN {
                return Err(PathError::SegmentTooLong);
            }
            if let Some(c) = segment
                .chars()
                .find(|c| c.is_control() || Self::FORBIDDEN.contains(c))
            {
                return Err(PathError::InvalidChar(c));
            }
            inner.push(Self::SEPARATOR);
            inner.push_str(segment);
        }
        if inner.is_empty() {
            inner.push(Self::SEPARATOR);
        }
        Ok(SdPath { inner })
    }

    /// The mount point itself.
    pub fn root() -> SdPath {
        SdPath {
            inner: String::from("/"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn is_root(&self) -> bool {
        self.inner.len() == 1
    }

    /// The last segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.inner.rsplit(Self::SEPARATOR).next()
        }
    }

    /// The containing directory, `None` for the root.
    pub fn parent(&self) -> Option<SdPath> {
        if self.is_root() {
            return None;
        }
        let idx = self.inner.rfind(Self::SEPARATOR).unwrap_or(0);
        let parent = if idx == 0 { "/" } else { &self.inner[..idx] };
        Some(SdPath {
            inner: String::from(parent),
        })
    }

    /// Append a single name, which must not contain separators.
    pub fn join(&self, name: &str) -> Result<SdPath, PathError> {
        let mut joined = String::from(self.as_str());
        joined.push(Self::SEPARATOR);
        joined.push_str(name);
        SdPath::new(&joined)
    }

    /// Whether `self` lies directly inside `dir`.
    pub fn is_child_of(&self, dir: &SdPath) -> bool {
        self.parent().as_ref() == Some(dir)
    }

    /// Whether `self` lies anywhere below `dir`.
    pub fn is_below(&self, dir: &SdPath) -> bool {
        if self == dir {
            return false;
        }
        if dir.is_root() {
            return true;
        }
        self.inner.starts_with(dir.as_str())
            && self.inner[dir.inner.len()..].starts_with(Self::SEPARATOR)
    }

    /// Number of segments, 0 for the root.
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.inner.matches(Self::SEPARATOR).count()
        }
    }
}

impl fmt::Display for SdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(SdPath::new("log.txt").unwrap().as_str(), "/log.txt");
        assert_eq!(SdPath::new("/log.txt").unwrap().as_str(), "/log.txt");
        assert_eq!(
            SdPath::new("//data/./2024//log.txt").unwrap().as_str(),
            "/data/2024/log.txt"
        );
        assert!(SdPath::new("").unwrap().is_root());
        assert!(SdPath::new("/").unwrap().is_root());
    }

    #[test]
    fn reject() {
        assert_eq!(SdPath::new("/a/../b"), Err(PathError::ParentSegment));
        assert_eq!(SdPath::new("/a:b"), Err(PathError::InvalidChar(':')));
        assert_eq!(SdPath::new("/a\nb"), Err(PathError::InvalidChar('\n')));
        let long = "x".repeat(MAX_SEGMENT_LEN + 1);
        assert_eq!(SdPath::new(&long), Err(PathError::SegmentTooLong));
    }

    #[test]
    fn relations() {
        let file = SdPath::new("/data/2024/log.txt").unwrap();
        assert_eq!(file.file_name(), Some("log.txt"));
        assert_eq!(file.parent().unwrap().as_str(), "/data/2024");
        assert_eq!(file.depth(), 3);
        assert!(file.is_below(&SdPath::new("/data").unwrap()));
        assert!(!file.is_below(&SdPath::new("/dat").unwrap()));
        assert!(file.is_child_of(&SdPath::new("/data/2024").unwrap()));
        assert!(!file.is_child_of(&SdPath::new("/data").unwrap()));

        let top = SdPath::new("top").unwrap();
        assert_eq!(top.parent(), Some(SdPath::root()));
        assert_eq!(SdPath::root().parent(), None);
        assert_eq!(SdPath::root().join("a").unwrap().as_str(), "/a");
    }
}
