use super::binary::{read_u32, read_u64, read_vec, write_u32, write_u64, write_vec};
use crate::context::Context;
use crate::error::{HdvError, HdvResult};
use crate::vector::DualBuffer;
use crate::DeviceOrdinal;
use std::io::{Read, Write};

/// Per-row information stored alongside a sparse matrix.
///
/// Labels and weights are dual buffers so that training code on a device can read them without
/// a host round trip. Either may be empty, meaning "not provided".
#[derive(Debug)]
pub struct MetaInfo {
    /// Number of rows.
    pub num_row: u64,
    /// Number of columns, one more than the largest feature index.
    pub num_col: u64,
    /// Number of stored entries.
    pub num_nonzero: u64,
    /// Label of each row.
    pub labels: DualBuffer<f32>,
    /// Weight of each row.
    pub weights: DualBuffer<f32>,
    /// Boundaries of query groups: group `i` spans rows `group_ptr[i]..group_ptr[i + 1]`. Empty
    /// when the rows are not grouped.
    pub group_ptr: Vec<u32>,
}

impl MetaInfo {
    /// Version written by [`save_binary`](#method.save_binary).
    pub const VERSION: u32 = 1;

    /// Creates empty meta information whose buffers live in `ctx`, assigned to `device`.
    pub fn new(ctx: &Context, device: Option<DeviceOrdinal>) -> HdvResult<Self> {
        Ok(MetaInfo {
            num_row: 0,
            num_col: 0,
            num_nonzero: 0,
            labels: DualBuffer::from_vec(ctx, Vec::new(), device)?,
            weights: DualBuffer::from_vec(ctx, Vec::new(), device)?,
            group_ptr: Vec::new(),
        })
    }

    /// Resets to the empty state, keeping the device assignment.
    pub fn clear(&mut self) {
        self.num_row = 0;
        self.num_col = 0;
        self.num_nonzero = 0;
        self.labels.copy_from_slice(&[]);
        self.weights.copy_from_slice(&[]);
        self.group_ptr.clear();
    }

    /// Assigns the label and weight buffers to `device`.
    pub fn set_device(&mut self, device: Option<DeviceOrdinal>) -> HdvResult<()> {
        self.labels.set_device(device)?;
        self.weights.set_device(device)
    }

    /// Replaces the contents with a copy of `other`.
    pub fn copy_from(&mut self, other: &MetaInfo) -> HdvResult<()> {
        self.labels.copy_from(&other.labels)?;
        self.weights.copy_from(&other.weights)?;
        self.num_row = other.num_row;
        self.num_col = other.num_col;
        self.num_nonzero = other.num_nonzero;
        self.group_ptr = other.group_ptr.clone();
        Ok(())
    }

    /// Writes the meta information to `w`.
    ///
    /// Labels and weights are downloaded first if only their device copies are current.
    pub fn save_binary<W: Write>(&mut self, w: &mut W) -> HdvResult<()> {
        write_u32(w, MetaInfo::VERSION)?;
        write_u64(w, self.num_row)?;
        write_u64(w, self.num_col)?;
        write_u64(w, self.num_nonzero)?;
        write_vec(w, self.labels.host_view()?)?;
        write_vec(w, &self.group_ptr)?;
        write_vec(w, self.weights.host_view()?)?;
        Ok(())
    }

    /// Reads meta information written by [`save_binary`](#method.save_binary).
    ///
    /// # Errors:
    ///
    /// `VersionMismatch` if the stream was written by another format version, `Format` if the
    /// labels, weights or groups disagree with the row count, `Io` if the stream ends early.
    pub fn load_binary<R: Read>(&mut self, r: &mut R) -> HdvResult<()> {
        let version = read_u32(r)?;
        if version != MetaInfo::VERSION {
            return Err(HdvError::VersionMismatch {
                expected: MetaInfo::VERSION,
                found: version,
            });
        }
        let num_row = read_u64(r)?;
        let num_col = read_u64(r)?;
        let num_nonzero = read_u64(r)?;
        let labels: Vec<f32> = read_vec(r)?;
        let group_ptr: Vec<u32> = read_vec(r)?;
        let weights: Vec<f32> = read_vec(r)?;

        check_per_row("labels", labels.len(), num_row)?;
        check_per_row("weights", weights.len(), num_row)?;
        if !group_ptr.is_empty() {
            let ordered = group_ptr.windows(2).all(|w| w[0] <= w[1]);
            if group_ptr[0] != 0 || !ordered || u64::from(group_ptr[group_ptr.len() - 1]) != num_row {
                return Err(HdvError::Format(
                    "group boundaries do not partition the rows".to_string(),
                ));
            }
        }

        self.num_row = num_row;
        self.num_col = num_col;
        self.num_nonzero = num_nonzero;
        self.labels.copy_from_slice(&labels);
        self.weights.copy_from_slice(&weights);
        self.group_ptr = group_ptr;
        Ok(())
    }
}

fn check_per_row(what: &str, len: usize, num_row: u64) -> HdvResult<()> {
    if len != 0 && len as u64 != num_row {
        return Err(HdvError::Format(format!(
            "{} {} values for {} rows",
            len, what, num_row
        )));
    }
    Ok(())
}
