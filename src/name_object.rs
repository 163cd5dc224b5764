//! AML name parsing and resolution (`spec.md` §4.1).
//!
//! Names are sequences of four-character segments with three prefix forms:
//! absolute (leading `\`), parent-relative (one or more leading `^`), and a
//! bare single unanchored segment. This mirrors
//! `original_source/src/ns.c: lai_amlname_parse`.

use crate::{opcode, AmlError};
use alloc::{string::String, vec::Vec};
use core::fmt;

/// One four-character name segment, e.g. `_SB_` or `PCI0`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameSeg(pub [u8; 4]);

impl NameSeg {
    pub const EMPTY: NameSeg = NameSeg(*b"____");

    pub fn from_str(s: &str) -> Result<NameSeg, AmlError> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err(AmlError::InvalidNameSeg);
        }
        let mut seg = [b'_'; 4];
        seg.copy_from_slice(bytes);
        Ok(NameSeg(seg))
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed `NameString`: absolute flag, parent-climb count, segment list,
/// and whether resolution should walk up through enclosing scopes
/// (true iff the name is a bare single segment).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmlName {
    pub absolute: bool,
    pub parent_climbs: usize,
    pub segments: Vec<NameSeg>,
}

impl AmlName {
    pub fn root() -> AmlName {
        AmlName { absolute: true, parent_climbs: 0, segments: Vec::new() }
    }

    /// True iff this name should be resolved by walking up through ancestor
    /// scopes (`spec.md` §4.1) rather than by literal descent.
    pub fn search_scopes(&self) -> bool {
        !self.absolute && self.parent_climbs == 0 && self.segments.len() == 1
    }

    pub fn single(seg: NameSeg) -> AmlName {
        AmlName { absolute: false, parent_climbs: 0, segments: alloc::vec![seg] }
    }

    /// Parses a `NameString` starting at `bytes[0]`. Returns the name and the
    /// number of bytes consumed.
    pub fn parse(bytes: &[u8]) -> Result<(AmlName, usize), AmlError> {
        let mut cursor = 0;
        let mut absolute = false;
        let mut parent_climbs = 0;

        if bytes.is_empty() {
            return Err(AmlError::UnexpectedEndOfStream);
        }

        if bytes[cursor] == b'\\' {
            absolute = true;
            cursor += 1;
        } else {
            while cursor < bytes.len() && bytes[cursor] == b'^' {
                parent_climbs += 1;
                cursor += 1;
            }
        }

        if cursor >= bytes.len() {
            return Err(AmlError::UnexpectedEndOfStream);
        }

        let num_segs = if bytes[cursor] == 0x00 {
            // NullName: zero segments, but only legal for an otherwise-empty name.
            cursor += 1;
            0
        } else if bytes[cursor] == opcode::DUAL_NAME_PREFIX {
            cursor += 1;
            2
        } else if bytes[cursor] == opcode::MULTI_NAME_PREFIX {
            cursor += 1;
            if cursor >= bytes.len() {
                return Err(AmlError::UnexpectedEndOfStream);
            }
            let count = bytes[cursor] as usize;
            cursor += 1;
            count
        } else if opcode::is_name_char(bytes[cursor]) {
            1
        } else {
            return Err(AmlError::InvalidNameSeg);
        };

        let mut segments = Vec::with_capacity(num_segs);
        for _ in 0..num_segs {
            if cursor + 4 > bytes.len() {
                return Err(AmlError::UnexpectedEndOfStream);
            }
            let mut seg = [0u8; 4];
            seg.copy_from_slice(&bytes[cursor..cursor + 4]);
            segments.push(NameSeg(seg));
            cursor += 4;
        }

        Ok((AmlName { absolute, parent_climbs, segments }, cursor))
    }

    /// Renders this name back into its canonical textual form, e.g.
    /// `\_SB.PCI0.S08`. Used for diagnostics and for the name-parsing
    /// roundtrip property in `spec.md` §8.
    pub fn to_string_path(&self) -> String {
        let mut out = String::new();
        if self.absolute {
            out.push('\\');
        }
        for _ in 0..self.parent_climbs {
            out.push('^');
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(seg.as_str());
        }
        out
    }

    /// Parses a dotted textual path like `\_SB.PCI0._ADR` into an `AmlName`,
    /// used by the core itself to address predefined objects (`spec.md` §4.6)
    /// without going through the AML byte-stream parser.
    pub fn from_str(s: &str) -> Result<AmlName, AmlError> {
        let mut rest = s;
        let mut absolute = false;
        let mut parent_climbs = 0;

        if let Some(stripped) = rest.strip_prefix('\\') {
            absolute = true;
            rest = stripped;
        } else {
            while let Some(stripped) = rest.strip_prefix('^') {
                parent_climbs += 1;
                rest = stripped;
            }
        }

        let segments = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('.')
                .map(|part| {
                    if part.len() != 4 {
                        Err(AmlError::InvalidNameSeg)
                    } else {
                        NameSeg::from_str(part)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(AmlName { absolute, parent_climbs, segments })
    }
}

impl fmt::Display for AmlName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// The target of a `Store` (or other write-producing reducer): an `Operand`
/// reinterpreted as a write destination (`spec.md` §4.4.2).
#[derive(Clone, Debug)]
pub enum Target {
    Null,
    Name(AmlName),
    Arg(u8),
    Local(u8),
    Debug,
}

