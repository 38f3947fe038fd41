//! # Numbered Storage Addresses
//!
//! Terminal storage is addressed by a `(directory, file)` pair of integers instead
//! of a path. This module defines the pair, the space of pairs a sweep walks,
//! and the canonical order that walk follows.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::config::defaults;
use crate::error::{Error, Result};

/// One entry slot on a terminal.
///
/// Ordering is directory first, then file, which is the order sweeps hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub directory: u32,
    pub file: u32,
}

impl Address {
    pub fn new(directory: u32, file: u32) -> Self {
        Self { directory, file }
    }

    /// Name used when an entry is written to disk.
    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.directory, self.file)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (directory, file) = s
            .split_once('.')
            .ok_or_else(|| format!("expected <directory>.<file>, got '{s}'"))?;
        let directory: u32 = directory
            .parse()
            .map_err(|e| format!("invalid directory number '{directory}': {e}"))?;
        let file: u32 = file
            .parse()
            .map_err(|e| format!("invalid file number '{file}': {e}"))?;
        Ok(Self::new(directory, file))
    }
}

/// Which file numbers a sweep visits inside every directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelector {
    /// Every number of an inclusive range.
    Range { min: u32, max: u32 },
    /// A sorted, de-duplicated list of numbers.
    Sampled(Vec<u32>),
}

impl FileSelector {
    fn len(&self) -> u64 {
        match self {
            FileSelector::Range { min, max } => u64::from(*max) - u64::from(*min) + 1,
            FileSelector::Sampled(files) => files.len() as u64,
        }
    }

    fn nth(&self, index: u64) -> Option<u32> {
        match self {
            FileSelector::Range { min, max } => {
                let file: u64 = u64::from(*min) + index;
                (file <= u64::from(*max)).then_some(file as u32)
            }
            FileSelector::Sampled(files) => files.get(index as usize).copied(),
        }
    }
}

/// File numbers worth trying first: `j * 10^i` for `i` in 0..=5 and `j` in 1..=9.
pub fn common_file_numbers() -> Vec<u32> {
    let mut numbers: Vec<u32> = Vec::with_capacity(54);
    for exponent in 0..=5 {
        let magnitude: u32 = 10u32.pow(exponent);
        for digit in 1..=9 {
            numbers.push(digit * magnitude);
        }
    }
    numbers
}

/// The set of addresses one sweep covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    directories: RangeInclusive<u32>,
    files: FileSelector,
}

impl AddressSpace {
    /// Every file of `file_min..=file_max` in every directory of `dir_min..=dir_max`.
    pub fn new(dir_min: u32, dir_max: u32, file_min: u32, file_max: u32) -> Result<Self> {
        check_bounds("directory", dir_min, dir_max)?;
        check_bounds("file", file_min, file_max)?;
        Ok(Self {
            directories: dir_min..=dir_max,
            files: FileSelector::Range {
                min: file_min,
                max: file_max,
            },
        })
    }

    /// Sparse sampling: the common file numbers plus `extra`, clipped to the file bounds.
    pub fn common(
        dir_min: u32,
        dir_max: u32,
        file_min: u32,
        file_max: u32,
        extra: &[u32],
    ) -> Result<Self> {
        check_bounds("directory", dir_min, dir_max)?;
        check_bounds("file", file_min, file_max)?;

        let mut files: Vec<u32> = common_file_numbers();
        files.extend_from_slice(extra);
        files.retain(|file| (file_min..=file_max).contains(file));
        files.sort_unstable();
        files.dedup();

        if files.is_empty() {
            return Err(Error::Configuration(format!(
                "no sampled file number falls inside {file_min}..={file_max}"
            )));
        }

        Ok(Self {
            directories: dir_min..=dir_max,
            files: FileSelector::Sampled(files),
        })
    }

    pub fn directories(&self) -> &RangeInclusive<u32> {
        &self.directories
    }

    pub fn files(&self) -> &FileSelector {
        &self.files
    }

    /// Refuses directories that do not fit a 16-bit wire field.
    pub fn ensure_directory_fits_u16(&self) -> Result<()> {
        if *self.directories.end() > u32::from(u16::MAX) {
            return Err(Error::Configuration(format!(
                "directory {} exceeds the protocol limit of {}",
                self.directories.end(),
                u16::MAX
            )));
        }
        Ok(())
    }

    /// Number of addresses in the space, saturating at `u64::MAX`.
    pub fn len(&self) -> u64 {
        let directories: u64 =
            u64::from(*self.directories.end()) - u64::from(*self.directories.start()) + 1;
        directories.saturating_mul(self.files.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<Address> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<Address> {
        let file: u32 = self.files.nth(self.files.len().checked_sub(1)?)?;
        Some(Address::new(*self.directories.end(), file))
    }

    /// Walks the space in canonical order.
    pub fn iter(&self) -> AddressIter {
        AddressIter {
            directory: Some(*self.directories.start()),
            dir_max: *self.directories.end(),
            file_index: 0,
            files: self.files.clone(),
        }
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self {
            directories: defaults::DIRECTORY_MIN..=defaults::DIRECTORY_MAX,
            files: FileSelector::Range {
                min: defaults::FILE_MIN,
                max: defaults::FILE_MAX,
            },
        }
    }
}

impl IntoIterator for &AddressSpace {
    type Item = Address;
    type IntoIter = AddressIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Cursor over an [`AddressSpace`]; owns its data so it can be shared between workers.
#[derive(Debug, Clone)]
pub struct AddressIter {
    directory: Option<u32>,
    dir_max: u32,
    file_index: u64,
    files: FileSelector,
}

impl Iterator for AddressIter {
    type Item = Address;

    fn next(&mut self) -> Option<Self::Item> {
        let directory: u32 = self.directory?;

        if let Some(file) = self.files.nth(self.file_index) {
            self.file_index += 1;
            return Some(Address::new(directory, file));
        }

        self.file_index = 0;
        self.directory = (directory < self.dir_max).then(|| directory + 1);
        self.next()
    }
}

fn check_bounds(what: &str, min: u32, max: u32) -> Result<()> {
    if min > max {
        return Err(Error::Configuration(format!(
            "{what} range is empty: minimum {min} is above maximum {max}"
        )));
    }
    Ok(())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
