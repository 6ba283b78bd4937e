use super::binary::{read_u32, read_vec, write_u32, write_vec};
use super::columnar::{parse_interfaces, read_columns};
use super::{DataSource, Entry, MetaInfo, RowBlock, SparsePage};
use crate::context::Context;
use crate::error::{HdvError, HdvResult};
use crate::DeviceOrdinal;
use std::convert::TryFrom;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// The simplest data source: one in-memory page of rows in compressed sparse row layout.
///
/// # Examples:
///
/// ```
/// use hdvec::data::{CsrSource, RowBlock};
/// use hdvec::Context;
///
/// # fn main() -> hdvec::HdvResult<()> {
/// let mut source = CsrSource::new(&Context::host_only(), None)?;
/// let block = RowBlock {
///     offset: vec![0, 2, 3],
///     index: vec![0, 5, 2],
///     label: vec![1.0, 0.0],
///     ..RowBlock::default()
/// };
/// source.copy_from_parser(vec![Ok(block)])?;
/// assert_eq!(source.info().num_row, 2);
/// assert_eq!(source.info().num_col, 6);
/// assert_eq!(source.info().num_nonzero, 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CsrSource {
    ctx: Context,
    device: Option<DeviceOrdinal>,
    info: MetaInfo,
    page: SparsePage,
    at_first: bool,
}

impl CsrSource {
    /// Magic number identifying the binary format of a `CsrSource`.
    pub const MAGIC: u32 = 0xffff_ab01;

    /// Creates an empty source whose buffers live in `ctx`, assigned to `device`.
    pub fn new(ctx: &Context, device: Option<DeviceOrdinal>) -> HdvResult<Self> {
        Ok(CsrSource {
            ctx: ctx.clone(),
            device,
            info: MetaInfo::new(ctx, device)?,
            page: SparsePage::new(ctx, device)?,
            at_first: true,
        })
    }

    /// The device the source's buffers are assigned to.
    pub fn device_index(&self) -> Option<DeviceOrdinal> {
        self.device
    }

    /// Assigns every buffer of the source to `device`.
    ///
    /// On error every buffer is returned to the previous device.
    pub fn set_device(&mut self, device: Option<DeviceOrdinal>) -> HdvResult<()> {
        if let Some(device) = device {
            self.ctx.backend_for(device)?.select(device)?;
        }
        let previous = self.device;
        let result = self
            .info
            .set_device(device)
            .and_then(|()| self.page.set_device(device));
        if let Err(err) = result {
            let restored = self
                .info
                .set_device(previous)
                .and_then(|()| self.page.set_device(previous));
            if let Err(restore) = restored {
                warn!(error = %restore, "could not restore the previous device assignment");
            }
            return Err(err);
        }
        self.device = device;
        Ok(())
    }

    /// Meta information of the rows.
    pub fn info(&self) -> &MetaInfo {
        &self.info
    }

    /// Mutable meta information of the rows.
    pub fn info_mut(&mut self) -> &mut MetaInfo {
        &mut self.info
    }

    /// The page holding every row.
    pub fn page(&self) -> &SparsePage {
        &self.page
    }

    /// Mutable access to the page holding every row.
    pub fn page_mut(&mut self) -> &mut SparsePage {
        &mut self.page
    }

    /// Removes every row and resets the meta information.
    pub fn clear(&mut self) {
        self.page.clear();
        self.info.clear();
    }

    /// Replaces the contents with the meta information and every page of `source`.
    pub fn copy_from_source(&mut self, source: &mut dyn DataSource) -> HdvResult<()> {
        self.clear();
        self.info.copy_from(source.info())?;
        source.before_first();
        while source.next() {
            self.page.push_page(source.value_mut())?;
        }
        debug!(rows = self.page.size(), "copied data source");
        Ok(())
    }

    /// Replaces the contents with the rows produced by a parser.
    ///
    /// Labels and weights are collected in row order, `num_col` becomes one more than the largest
    /// feature index, and consecutive rows sharing a query id form a query group.
    ///
    /// # Errors:
    ///
    /// The first error produced by `blocks` is returned as is. `InvalidInput` if a block is
    /// malformed, if only some rows carry a query id, or if only some rows carry a label or a
    /// weight.
    pub fn copy_from_parser<I>(&mut self, blocks: I) -> HdvResult<()>
    where
        I: IntoIterator<Item = HdvResult<RowBlock>>,
    {
        self.clear();
        let mut labels = Vec::new();
        let mut weights = Vec::new();
        let mut group_ptr = Vec::new();
        let mut grouped: Option<bool> = None;
        let mut last_qid: Option<u64> = None;
        let mut num_row: u64 = 0;
        let mut num_col: u64 = 0;

        for block in blocks {
            let block = block?;
            block.validate()?;
            let rows = block.size();
            if rows == 0 {
                continue;
            }
            let has_qid = !block.qid.is_empty();
            if *grouped.get_or_insert(has_qid) != has_qid {
                return Err(HdvError::InvalidInput(
                    "either every row or no row must carry a query id".to_string(),
                ));
            }
            for &qid in &block.qid {
                if last_qid != Some(qid) {
                    group_ptr.push(group_boundary(num_row)?);
                }
                last_qid = Some(qid);
                num_row += 1;
            }
            if !has_qid {
                num_row += rows as u64;
            }

            let cells = block.offset[0] as usize..block.offset[rows] as usize;
            if let Some(max) = block.index[cells].iter().max() {
                num_col = num_col.max(u64::from(*max) + 1);
            }
            labels.extend_from_slice(&block.label);
            weights.extend_from_slice(&block.weight);
            self.page.push_block(&block)?;
        }
        if last_qid.is_some() {
            group_ptr.push(group_boundary(num_row)?);
        }
        for (name, len) in &[("labels", labels.len()), ("weights", weights.len())] {
            if *len != 0 && *len as u64 != num_row {
                return Err(HdvError::InvalidInput(format!(
                    "{} rows but {} {}",
                    num_row, len, name
                )));
            }
        }

        self.info.num_row = num_row;
        self.info.num_col = num_col;
        self.info.num_nonzero = self.page.data.size() as u64;
        self.info.labels.copy_from_slice(&labels);
        self.info.weights.copy_from_slice(&weights);
        self.info.group_ptr = group_ptr;
        debug!(
            rows = num_row,
            cols = num_col,
            nonzero = self.info.num_nonzero,
            groups = self.info.group_ptr.len().saturating_sub(1),
            "parsed rows"
        );
        Ok(())
    }

    /// Replaces the contents with columns that already live on the source's device.
    ///
    /// `interfaces` is a JSON list of [`ArrayInterface`](struct.ArrayInterface.html) objects, one
    /// per column, all with the same number of rows. Cell `(r, c)` becomes an entry of row `r`
    /// with feature index `c` unless it is NaN or masked out. The page ends up current on the
    /// device only.
    ///
    /// # Errors:
    ///
    /// `InvalidInput` if the source has no device or a column description is unusable, `Json` if
    /// `interfaces` is not valid JSON, `InvalidAddress` if a column lies outside device memory.
    pub fn copy_from_columnar(&mut self, interfaces: &str) -> HdvResult<()> {
        let device = self.device.ok_or_else(|| {
            HdvError::InvalidInput("columnar ingestion needs a source assigned to a device".to_string())
        })?;
        let interfaces = parse_interfaces(interfaces)?;
        let backend = Arc::clone(self.ctx.backend_for(device)?);
        let columns = read_columns(&*backend, device, &interfaces)?;
        let num_col = u32::try_from(columns.len())
            .map_err(|_| HdvError::InvalidInput("too many columns".to_string()))?;

        let rows = columns[0].len();
        let mut offset = Vec::with_capacity(rows + 1);
        let mut data = Vec::new();
        offset.push(0u64);
        for row in 0..rows {
            for (index, column) in (0..num_col).zip(&columns) {
                if let Some(fvalue) = column.get(row) {
                    data.push(Entry { index, fvalue });
                }
            }
            offset.push(data.len() as u64);
        }

        self.clear();
        self.page.offset.copy_from_slice(&offset);
        self.page.data.copy_from_slice(&data);
        self.page.move_to_device()?;
        self.info.num_row = rows as u64;
        self.info.num_col = u64::from(num_col);
        self.info.num_nonzero = data.len() as u64;
        debug!(%device, rows, cols = num_col, nonzero = data.len(), "ingested device columns");
        Ok(())
    }

    /// Writes the source to `w`: the magic number, the meta information, then the page.
    pub fn save_binary<W: Write>(&mut self, w: &mut W) -> HdvResult<()> {
        write_u32(w, CsrSource::MAGIC)?;
        self.info.save_binary(w)?;
        let page = self.page.host_page()?;
        write_vec(w, page.offset)?;
        write_vec(w, page.data)?;
        Ok(())
    }

    /// Replaces the contents with a source written by [`save_binary`](#method.save_binary).
    ///
    /// On error the source is left unchanged.
    ///
    /// # Errors:
    ///
    /// `BadMagic` if the stream does not hold a `CsrSource`, `VersionMismatch` if its meta
    /// information has another format version, `Format` if the decoded arrays are inconsistent,
    /// `Io` if the stream ends early.
    pub fn load_binary<R: Read>(&mut self, r: &mut R) -> HdvResult<()> {
        let magic = read_u32(r)?;
        if magic != CsrSource::MAGIC {
            return Err(HdvError::BadMagic {
                expected: CsrSource::MAGIC,
                found: magic,
            });
        }
        let mut info = MetaInfo::new(&self.ctx, self.device)?;
        info.load_binary(r)?;
        let offset: Vec<u64> = read_vec(r)?;
        let data: Vec<Entry> = read_vec(r)?;
        check_offsets(&offset, data.len())?;
        if info.num_row != (offset.len() - 1) as u64 || info.num_nonzero != data.len() as u64 {
            return Err(HdvError::Format(format!(
                "meta information describes {} rows and {} entries, page holds {} and {}",
                info.num_row,
                info.num_nonzero,
                offset.len() - 1,
                data.len()
            )));
        }

        self.info = info;
        self.page.clear();
        self.page.offset.copy_from_slice(&offset);
        self.page.data.copy_from_slice(&data);
        self.at_first = true;
        debug!(rows = self.info.num_row, nonzero = self.info.num_nonzero, "loaded binary source");
        Ok(())
    }
}

fn group_boundary(row: u64) -> HdvResult<u32> {
    u32::try_from(row).map_err(|_| {
        HdvError::InvalidInput(format!("query group boundary {} exceeds u32", row))
    })
}

fn check_offsets(offset: &[u64], entries: usize) -> HdvResult<()> {
    match (offset.first(), offset.last()) {
        (Some(&0), Some(&last)) if last == entries as u64 => {}
        _ => {
            return Err(HdvError::Format(format!(
                "row offsets do not span the {} stored entries",
                entries
            )))
        }
    }
    if offset.windows(2).any(|w| w[0] > w[1]) {
        return Err(HdvError::Format("row offsets decrease".to_string()));
    }
    Ok(())
}

impl DataSource for CsrSource {
    fn next(&mut self) -> bool {
        if self.at_first {
            self.at_first = false;
            true
        } else {
            false
        }
    }

    fn before_first(&mut self) {
        self.at_first = true;
    }

    fn value(&self) -> &SparsePage {
        &self.page
    }

    fn value_mut(&mut self) -> &mut SparsePage {
        &mut self.page
    }

    fn info(&self) -> &MetaInfo {
        &self.info
    }
}
