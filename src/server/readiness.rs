//! Readiness interest and descriptor sets.

use std::os::fd::RawFd;

/// What a blocked request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

impl Interest {
    /// Not waiting on the socket at all.
    pub const NONE: Interest = Interest(0);
    /// Waiting for the socket to become readable.
    pub const READABLE: Interest = Interest(0b01);
    /// Waiting for the socket to accept more output.
    pub const WRITABLE: Interest = Interest(0b10);

    pub const fn is_readable(&self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    pub const fn is_writable(&self) -> bool {
        self.0 & Self::WRITABLE.0 != 0
    }

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// A set of file descriptors, one bit per descriptor number.
///
/// Bits are set and cleared as requests block and wake, so the set always
/// reflects the current blocked list without a rebuild.
#[derive(Debug, Clone, Default)]
pub struct FdSet {
    words: Vec<u64>,
    len: usize,
}

impl FdSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(fd: RawFd) -> Option<(usize, u64)> {
        let fd = usize::try_from(fd).ok()?;
        Some((fd / 64, 1 << (fd % 64)))
    }

    /// Sets the bit for `fd`. Returns false if it was already set.
    pub fn insert(&mut self, fd: RawFd) -> bool {
        let Some((word, bit)) = Self::slot(fd) else {
            return false;
        };
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        if self.words[word] & bit != 0 {
            return false;
        }
        self.words[word] |= bit;
        self.len += 1;
        true
    }

    /// Clears the bit for `fd`. Returns false if it was not set.
    pub fn remove(&mut self, fd: RawFd) -> bool {
        let Some((word, bit)) = Self::slot(fd) else {
            return false;
        };
        match self.words.get_mut(word) {
            Some(w) if *w & bit != 0 => {
                *w &= !bit;
                self.len -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        Self::slot(fd).is_some_and(|(word, bit)| self.words.get(word).is_some_and(|w| w & bit != 0))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Descriptors in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..64usize)
                .filter(move |&b| w & (1u64 << b) != 0)
                .map(move |b| (i * 64 + b) as RawFd)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_tracks_len() {
        let mut set = FdSet::new();
        assert!(set.insert(3));
        assert!(set.insert(130));
        assert!(!set.insert(3));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 130]);

        assert!(set.remove(3));
        assert!(!set.remove(3));
        assert!(!set.contains(3));
        assert!(set.contains(130));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn negative_descriptors_are_ignored() {
        let mut set = FdSet::new();
        assert!(!set.insert(-1));
        assert!(set.is_empty());
    }
}
