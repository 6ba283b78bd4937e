use super::{Entry, RowBlock};
use crate::context::Context;
use crate::error::{HdvError, HdvResult};
use crate::vector::DualBuffer;
use crate::{DeviceOrdinal, GpuAccess};
use std::ops::Range;

/// A batch of rows in compressed sparse row layout.
///
/// Row `i` consists of the entries `data[offset[i]..offset[i + 1]]`; `offset` always starts with
/// 0 and has one element more than there are rows. Both arrays are dual buffers and may be current
/// on the host, the device or both.
#[derive(Debug)]
pub struct SparsePage {
    /// Row boundaries into `data`.
    pub offset: DualBuffer<u64>,
    /// Entries of all rows, row after row.
    pub data: DualBuffer<Entry>,
    /// Global index of the first row of this page.
    pub base_rowid: u64,
}

/// Host view of a [`SparsePage`].
#[derive(Clone, Copy, Debug)]
pub struct HostPage<'a> {
    /// Row boundaries into `data`.
    pub offset: &'a [u64],
    /// Entries of all rows.
    pub data: &'a [Entry],
    /// Global index of the first row.
    pub base_rowid: u64,
}

impl<'a> HostPage<'a> {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.offset.len().saturating_sub(1)
    }

    /// Returns true if the page holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries of row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn row(&self, i: usize) -> &'a [Entry] {
        &self.data[self.row_range(i)]
    }

    /// Iterates over the rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &'a [Entry]> + 'a {
        let (offset, data) = (self.offset, self.data);
        offset
            .windows(2)
            .map(move |w| &data[w[0] as usize..w[1] as usize])
    }

    fn row_range(&self, i: usize) -> Range<usize> {
        self.offset[i] as usize..self.offset[i + 1] as usize
    }
}

impl SparsePage {
    /// Creates an empty page whose buffers live in `ctx`, assigned to `device`.
    pub fn new(ctx: &Context, device: Option<DeviceOrdinal>) -> HdvResult<Self> {
        Ok(SparsePage {
            offset: DualBuffer::from_vec(ctx, vec![0], device)?,
            data: DualBuffer::from_vec(ctx, Vec::new(), device)?,
            base_rowid: 0,
        })
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.offset.size().saturating_sub(1)
    }

    /// Returns true if the page holds no rows.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Removes every row.
    pub fn clear(&mut self) {
        self.base_rowid = 0;
        self.offset.copy_from_slice(&[0]);
        self.data.copy_from_slice(&[]);
    }

    /// Assigns both arrays to `device`.
    pub fn set_device(&mut self, device: Option<DeviceOrdinal>) -> HdvResult<()> {
        self.offset.set_device(device)?;
        self.data.set_device(device)
    }

    /// Host view of the page, downloading whichever array is only current on the device.
    pub fn host_page(&mut self) -> HdvResult<HostPage<'_>> {
        let offset = self.offset.host_view()?;
        let data = self.data.host_view()?;
        Ok(HostPage {
            offset,
            data,
            base_rowid: self.base_rowid,
        })
    }

    /// Makes the device copies of both arrays the only current ones.
    pub fn move_to_device(&mut self) -> HdvResult<()> {
        let _ = self.offset.device_view_mut()?;
        let _ = self.data.device_view_mut()?;
        Ok(())
    }

    /// Appends the rows of `block`. Missing values become 1.0.
    pub fn push_block(&mut self, block: &RowBlock) -> HdvResult<()> {
        block.validate()?;
        let values = block.value.as_ref();
        let first = block.offset[0] as usize;
        let last = block.offset[block.size()] as usize;
        let entries: Vec<Entry> = (first..last)
            .map(|k| Entry {
                index: block.index[k],
                fvalue: values.map_or(1.0, |v| v[k]),
            })
            .collect();

        let base = self.data.size() as u64;
        let offsets: Vec<u64> = block.offset[1..]
            .iter()
            .map(|&o| base + o - first as u64)
            .collect();
        self.offset.extend_from_slice(&offsets)?;
        self.data.extend_from_slice(&entries)
    }

    /// Appends the rows of `batch`.
    pub fn push_page(&mut self, batch: &mut SparsePage) -> HdvResult<()> {
        let view = batch.host_page()?;
        if view.offset.first().copied() != Some(0) {
            return Err(HdvError::InvalidInput(
                "page offsets must start at zero".to_string(),
            ));
        }
        let base = self.data.size() as u64;
        let offsets: Vec<u64> = view.offset[1..].iter().map(|&o| base + o).collect();
        self.offset.extend_from_slice(&offsets)?;
        self.data.extend_from_slice(view.data)
    }

    /// Returns true if neither array needs a transfer to be read on the host.
    pub fn host_readable(&self) -> bool {
        self.offset.host_can_access(GpuAccess::Read) && self.data.host_can_access(GpuAccess::Read)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(index: u32, fvalue: f32) -> Entry {
        Entry { index, fvalue }
    }

    #[test]
    fn test_push_block_rebases_offsets() {
        let ctx = Context::host_only();
        let mut page = SparsePage::new(&ctx, None).unwrap();
        let block = RowBlock {
            offset: vec![0, 2, 3],
            index: vec![0, 4, 1],
            value: Some(vec![0.5, 1.5, 2.5]),
            ..RowBlock::default()
        };
        page.push_block(&block).unwrap();
        page.push_block(&block).unwrap();

        assert_eq!(page.size(), 4);
        let view = page.host_page().unwrap();
        assert_eq!(view.offset, &[0, 2, 3, 5, 6]);
        assert_eq!(view.row(1), &[entry(1, 2.5)]);
        assert_eq!(view.row(2), &[entry(0, 0.5), entry(4, 1.5)]);
        assert_eq!(view.rows().count(), 4);
    }

    #[test]
    fn test_push_block_defaults_missing_values() {
        let mut page = SparsePage::new(&Context::host_only(), None).unwrap();
        let block = RowBlock {
            offset: vec![0, 1],
            index: vec![3],
            ..RowBlock::default()
        };
        page.push_block(&block).unwrap();
        assert_eq!(page.host_page().unwrap().row(0), &[entry(3, 1.0)]);
    }

    #[test]
    fn test_push_page_appends() {
        let ctx = Context::host_only();
        let mut first = SparsePage::new(&ctx, None).unwrap();
        let mut second = SparsePage::new(&ctx, None).unwrap();
        second.offset.copy_from_slice(&[0, 1, 1]);
        second.data.copy_from_slice(&[entry(2, 9.0)]);
        first.push_page(&mut second).unwrap();
        first.push_page(&mut second).unwrap();

        let view = first.host_page().unwrap();
        assert_eq!(view.offset, &[0, 1, 1, 2, 2]);
        assert_eq!(view.data.len(), 2);
        assert!(view.row(1).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut page = SparsePage::new(&Context::host_only(), None).unwrap();
        page.offset.copy_from_slice(&[0, 1]);
        page.data.copy_from_slice(&[entry(0, 1.0)]);
        page.base_rowid = 10;
        page.clear();
        assert!(page.is_empty());
        assert_eq!(page.base_rowid, 0);
        assert_eq!(page.host_page().unwrap().offset, &[0]);
    }
}
