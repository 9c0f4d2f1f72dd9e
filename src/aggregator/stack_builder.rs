//! Build the per-chunk call stack index.
//!
//! A single pass over the chunk pairs every `FunctionEnter` with its
//! `FunctionExit` and records the closed range of positions the frame covers:
//!
//! ```text
//! pos:   0      1      2      3      4      5
//!        enter  acc    enter  acc    exit   exit
//!        [f ..................................]   f covers 0..=4
//!                      [g .........]              g covers 2..=3
//! ```
//!
//! Frames still open when the previous chunk ended arrive as the carry-in
//! context. They are addressed by slot (bottom of the stack first) and cover
//! the current chunk from position 0 until their exit. Frames still open at
//! the end of this chunk cover it to the end and become the carry-out.

use super::interval_tree::{Interval, IntervalTree};
use crate::parser::Record;
use crate::utils::error::IndexError;
use log::debug;

/// Where a frame was entered
///
/// Ordering puts inherited frames (outermost) before local ones, and each
/// group in stack order, so sorting frames by origin sorts them outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameOrigin {
    /// Slot in the carried-in context, 0 = bottom of the stack
    Inherited(usize),
    /// Position of the `FunctionEnter` record in this chunk
    Local(usize),
}

impl FrameOrigin {
    /// First position of this chunk the frame covers
    fn first_position(self) -> usize {
        match self {
            FrameOrigin::Inherited(_) => 0,
            FrameOrigin::Local(position) => position,
        }
    }
}

/// One call frame as seen from this chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub origin: FrameOrigin,
    pub function_pointer: u64,

    /// Whether the matching exit lies inside this chunk
    pub closed: bool,
}

impl Frame {
    /// The `FunctionEnter` record that opened this frame
    pub fn enter_record(&self) -> Record {
        Record::FunctionEnter {
            function_pointer: self.function_pointer,
        }
    }
}

/// Interval index answering "which frames enclose position N"
#[derive(Debug, Clone, Default)]
pub struct CallStackIndex {
    tree: IntervalTree<Frame>,
    chunk_len: usize,
}

impl CallStackIndex {
    /// Build the index for one chunk
    ///
    /// **Public** - main entry point, called once per chunk
    ///
    /// # Arguments
    /// * `carry_in` - frames open at the end of the previous chunk, bottom first
    /// * `records` - this chunk's records
    ///
    /// # Returns
    /// The index plus the carry-out context for the next chunk
    ///
    /// # Errors
    /// * `IndexError::UnbalancedStack` - an exit does not match the innermost open frame
    /// * `IndexError::InvalidContextRecord` - carry-in holds something other than an enter
    pub fn build(carry_in: &[Record], records: &[Record]) -> Result<(Self, Vec<Record>), IndexError> {
        let mut open: Vec<(FrameOrigin, u64)> = carry_in
            .iter()
            .enumerate()
            .map(|(slot, record)| match record {
                Record::FunctionEnter { function_pointer } => {
                    Ok((FrameOrigin::Inherited(slot), *function_pointer))
                }
                _ => Err(IndexError::InvalidContextRecord { slot }),
            })
            .collect::<Result<_, _>>()?;

        let mut intervals = Vec::new();

        for (position, record) in records.iter().enumerate() {
            match *record {
                Record::FunctionEnter { function_pointer } => {
                    open.push((FrameOrigin::Local(position), function_pointer));
                }
                Record::FunctionExit { function_pointer } => {
                    let (origin, entered) = open.pop().ok_or(IndexError::UnbalancedStack {
                        position,
                        expected: None,
                        found: function_pointer,
                    })?;
                    if entered != function_pointer {
                        return Err(IndexError::UnbalancedStack {
                            position,
                            expected: Some(entered),
                            found: function_pointer,
                        });
                    }

                    // An inherited frame exiting at position 0 covers nothing here
                    if position > origin.first_position() {
                        intervals.push(Interval {
                            start: origin.first_position(),
                            end: position - 1,
                            value: Frame {
                                origin,
                                function_pointer,
                                closed: true,
                            },
                        });
                    }
                }
                Record::MemoryAccess(_) => {}
            }
        }

        if let Some(last) = records.len().checked_sub(1) {
            for &(origin, function_pointer) in &open {
                intervals.push(Interval {
                    start: origin.first_position(),
                    end: last,
                    value: Frame {
                        origin,
                        function_pointer,
                        closed: false,
                    },
                });
            }
        }

        let carry_out: Vec<Record> = open
            .iter()
            .map(|&(_, function_pointer)| Record::FunctionEnter { function_pointer })
            .collect();

        let tree = IntervalTree::build(intervals);
        debug!(
            "Indexed {} frames over {} records ({} inherited, {} carried out)",
            tree.len(),
            records.len(),
            carry_in.len(),
            carry_out.len()
        );

        Ok((
            Self {
                tree,
                chunk_len: records.len(),
            },
            carry_out,
        ))
    }

    /// Number of records the index was built over
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    /// Number of indexed frames
    pub fn frame_count(&self) -> usize {
        self.tree.len()
    }

    /// Frames enclosing `position`, outermost first
    pub fn frames_at(&self, position: usize) -> Vec<Frame> {
        if position >= self.chunk_len {
            return Vec::new();
        }
        let mut frames: Vec<Frame> = self.tree.query(position).into_iter().map(|iv| iv.value).collect();
        frames.sort_by_key(|frame| frame.origin);
        frames
    }

    /// Enter records of the frames enclosing `position`, outermost first
    pub fn stack_at(&self, position: usize) -> Vec<Record> {
        self.frames_at(position).iter().map(Frame::enter_record).collect()
    }
}
