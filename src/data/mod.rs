//! Sparse feature matrices stored in dual buffers.
//!
//! A [`CsrSource`] holds a matrix in compressed sparse row layout together with its
//! [`MetaInfo`] (labels, weights, query groups). Every array is a
//! [`DualBuffer`](../vector/struct.DualBuffer.html), so the matrix can be built on the host and
//! consumed on a device, or ingested from columns that already live on a device, without the
//! caller managing copies.
//!
//! Matrices can be built from:
//!
//! - another [`DataSource`],
//! - a parser yielding [`RowBlock`]s,
//! - a JSON description of device-resident columns (see
//!   [`CsrSource::copy_from_columnar`](struct.CsrSource.html#method.copy_from_columnar)),
//! - the binary format written by [`CsrSource::save_binary`](struct.CsrSource.html#method.save_binary).

mod binary;
mod columnar;
mod csr_source;
mod meta;
mod sparse_page;

pub use self::columnar::{ArrayInterface, MaskInterface};
pub use self::csr_source::CsrSource;
pub use self::meta::MetaInfo;
pub use self::sparse_page::{HostPage, SparsePage};

use crate::error::{HdvError, HdvResult};
use crate::DeviceCopy;
use bytemuck::{Pod, Zeroable};

/// One stored cell of a sparse row: a feature index and its value.
#[derive(Clone, Copy, Debug, Default, PartialEq, DeviceCopy, Pod, Zeroable)]
#[repr(C)]
pub struct Entry {
    /// Feature (column) index.
    pub index: u32,
    /// Feature value.
    pub fvalue: f32,
}

/// A batch of parsed rows in CSR layout, as produced by a text parser.
///
/// Row `i` spans `index[offset[i]..offset[i + 1]]`. `offset` need not start at zero. `value`,
/// `label`, `weight` and `qid` are optional: `value` may be `None` (every value is 1.0), the
/// others may be empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowBlock {
    /// Row boundaries, one more than the number of rows.
    pub offset: Vec<u64>,
    /// Feature index of each cell.
    pub index: Vec<u32>,
    /// Value of each cell.
    pub value: Option<Vec<f32>>,
    /// Label of each row.
    pub label: Vec<f32>,
    /// Weight of each row.
    pub weight: Vec<f32>,
    /// Query id of each row.
    pub qid: Vec<u64>,
}

impl RowBlock {
    /// Number of rows.
    pub fn size(&self) -> usize {
        self.offset.len().saturating_sub(1)
    }

    /// Checks that the arrays describe well-formed rows.
    pub fn validate(&self) -> HdvResult<()> {
        let rows = self.size();
        if self.offset.is_empty() {
            return Err(invalid("row block has no offsets"));
        }
        if self.offset.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid("row block offsets decrease"));
        }
        let end = self.offset[rows] as usize;
        if end > self.index.len() {
            return Err(invalid(format!(
                "row block ends at cell {} but has {} indices",
                end,
                self.index.len()
            )));
        }
        if let Some(value) = &self.value {
            if value.len() != self.index.len() {
                return Err(invalid("row block has different numbers of indices and values"));
            }
        }
        for (name, len) in &[
            ("label", self.label.len()),
            ("weight", self.weight.len()),
            ("qid", self.qid.len()),
        ] {
            if *len != 0 && *len != rows {
                return Err(invalid(format!(
                    "row block has {} {} values for {} rows",
                    len, name, rows
                )));
            }
        }
        Ok(())
    }
}

fn invalid<S: Into<String>>(message: S) -> HdvError {
    HdvError::InvalidInput(message.into())
}

/// A sequence of [`SparsePage`]s with shared meta information.
///
/// Iteration follows a cursor protocol: [`before_first`](#tymethod.before_first) rewinds,
/// [`next`](#tymethod.next) advances and reports whether a page is available, and
/// [`value`](#tymethod.value) returns the current page.
pub trait DataSource {
    /// Advances to the next page. Returns false once every page has been visited.
    fn next(&mut self) -> bool;

    /// Rewinds so that the following [`next`](#tymethod.next) yields the first page.
    fn before_first(&mut self);

    /// The current page.
    fn value(&self) -> &SparsePage;

    /// The current page, for callers that need host or device views of it.
    fn value_mut(&mut self) -> &mut SparsePage;

    /// Meta information covering every page.
    fn info(&self) -> &MetaInfo;
}
