//! Descriptions of device-resident columns in the array-interface layout.
//!
//! Each column is described by a JSON object such as
//!
//! ```json
//! {"data": [140233120, false], "shape": [3], "typestr": "<f4", "version": 1,
//!  "mask": {"data": [140233632, false], "shape": [3], "typestr": "|t1"}}
//! ```
//!
//! `data` holds the device address and a read-only flag. Only contiguous one-dimensional columns
//! are accepted.

use crate::backend::DeviceBackend;
use crate::error::{HdvError, HdvResult};
use crate::memory::{DevicePointer, DeviceSlice};
use crate::DeviceOrdinal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Array-interface description of one column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayInterface {
    /// Device address of the first element and whether the memory is read-only.
    pub data: (u64, bool),
    /// Number of elements, as a one-element list.
    pub shape: Vec<usize>,
    /// Element type: `<f4`, `<f8`, `<i4`, `<i8` or `<u4`.
    pub typestr: String,
    /// Interface version.
    #[serde(default)]
    pub version: u32,
    /// Optional validity mask; rows whose mask entry is unset are missing.
    #[serde(default)]
    pub mask: Option<MaskInterface>,
    /// Must be absent or null; strided columns are not supported.
    #[serde(default)]
    pub strides: Option<Vec<usize>>,
}

/// Array-interface description of a validity mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskInterface {
    /// Device address of the mask and whether the memory is read-only.
    pub data: (u64, bool),
    /// Number of rows covered by the mask.
    pub shape: Vec<usize>,
    /// `|t1` for a bitmask (bit `i % 8` of byte `i / 8`, least significant first), `|i1`, `|u1`
    /// or `|b1` for one byte per row.
    pub typestr: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ElementType {
    F4,
    F8,
    I4,
    I8,
    U4,
}

impl ElementType {
    fn parse(typestr: &str) -> HdvResult<Self> {
        match typestr {
            "<f4" => Ok(ElementType::F4),
            "<f8" => Ok(ElementType::F8),
            "<i4" => Ok(ElementType::I4),
            "<i8" => Ok(ElementType::I8),
            "<u4" => Ok(ElementType::U4),
            other => Err(HdvError::InvalidInput(format!(
                "unsupported column type `{}`",
                other
            ))),
        }
    }

    fn width(self) -> usize {
        match self {
            ElementType::F4 | ElementType::I4 | ElementType::U4 => 4,
            ElementType::F8 | ElementType::I8 => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            ElementType::F4 => bytemuck::pod_read_unaligned::<f32>(bytes),
            ElementType::F8 => bytemuck::pod_read_unaligned::<f64>(bytes) as f32,
            ElementType::I4 => bytemuck::pod_read_unaligned::<i32>(bytes) as f32,
            ElementType::I8 => bytemuck::pod_read_unaligned::<i64>(bytes) as f32,
            ElementType::U4 => bytemuck::pod_read_unaligned::<u32>(bytes) as f32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MaskKind {
    Bits,
    Bytes,
}

impl MaskKind {
    fn parse(typestr: &str) -> HdvResult<Self> {
        match typestr {
            "|t1" => Ok(MaskKind::Bits),
            "|i1" | "|u1" | "|b1" => Ok(MaskKind::Bytes),
            other => Err(HdvError::InvalidInput(format!(
                "unsupported mask type `{}`",
                other
            ))),
        }
    }
}

/// A column copied to the host, with its validity.
#[derive(Debug)]
pub(crate) struct Column {
    values: Vec<f32>,
    valid: Option<Vec<bool>>,
}

impl Column {
    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    /// Value of `row`, or `None` if it is masked out or NaN.
    pub(crate) fn get(&self, row: usize) -> Option<f32> {
        if let Some(valid) = &self.valid {
            if !valid[row] {
                return None;
            }
        }
        let value = self.values[row];
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }
}

/// Parses a JSON list of column descriptions.
pub(crate) fn parse_interfaces(json: &str) -> HdvResult<Vec<ArrayInterface>> {
    let interfaces: Vec<ArrayInterface> = serde_json::from_str(json)?;
    if interfaces.is_empty() {
        return Err(HdvError::InvalidInput(
            "no columns described".to_string(),
        ));
    }
    Ok(interfaces)
}

/// Reads every column from `device`. All columns must have the same length.
pub(crate) fn read_columns(
    backend: &dyn DeviceBackend,
    device: DeviceOrdinal,
    interfaces: &[ArrayInterface],
) -> HdvResult<Vec<Column>> {
    let columns = interfaces
        .iter()
        .map(|interface| read_column(backend, device, interface))
        .collect::<HdvResult<Vec<Column>>>()?;
    let rows = columns[0].len();
    if let Some(position) = columns.iter().position(|c| c.len() != rows) {
        return Err(HdvError::InvalidInput(format!(
            "column {} has {} rows, column 0 has {}",
            position,
            columns[position].len(),
            rows
        )));
    }
    Ok(columns)
}

fn one_dimensional(shape: &[usize]) -> HdvResult<usize> {
    match shape {
        [len] => Ok(*len),
        _ => Err(HdvError::InvalidInput(format!(
            "expected a one-dimensional shape, found {:?}",
            shape
        ))),
    }
}

fn read_bytes(
    backend: &dyn DeviceBackend,
    device: DeviceOrdinal,
    address: u64,
    len: usize,
) -> HdvResult<Vec<u8>> {
    // Foreign memory; the backend rejects ranges outside live allocations.
    unsafe {
        let ptr = DevicePointer::from_address(address as usize);
        DeviceSlice::from_raw_parts(backend, device, ptr, len).to_vec()
    }
}

fn read_column(
    backend: &dyn DeviceBackend,
    device: DeviceOrdinal,
    interface: &ArrayInterface,
) -> HdvResult<Column> {
    if interface.strides.is_some() {
        return Err(HdvError::InvalidInput(
            "strided columns are not supported".to_string(),
        ));
    }
    let rows = one_dimensional(&interface.shape)?;
    let element = ElementType::parse(&interface.typestr)?;
    let bytes = rows.checked_mul(element.width()).ok_or_else(|| {
        HdvError::InvalidInput(format!("column of {} rows is too large", rows))
    })?;
    let raw = read_bytes(backend, device, interface.data.0, bytes)?;
    let values = raw
        .chunks_exact(element.width())
        .map(|bytes| element.decode(bytes))
        .collect();

    let valid = match &interface.mask {
        None => None,
        Some(mask) => {
            let kind = MaskKind::parse(&mask.typestr)?;
            let covered = one_dimensional(&mask.shape)?;
            if covered < rows {
                return Err(HdvError::InvalidInput(format!(
                    "mask covers {} rows of a {} row column",
                    covered, rows
                )));
            }
            Some(match kind {
                MaskKind::Bits => {
                    let bits = read_bytes(backend, device, mask.data.0, (rows + 7) / 8)?;
                    (0..rows).map(|i| bits[i / 8] & (1 << (i % 8)) != 0).collect()
                }
                MaskKind::Bytes => read_bytes(backend, device, mask.data.0, rows)?
                    .into_iter()
                    .map(|b| b != 0)
                    .collect(),
            })
        }
    };
    debug!(%device, rows, typestr = %interface.typestr, masked = valid.is_some(), "read column");
    Ok(Column { values, valid })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::SimulatedDevice;
    use crate::memory::{CopyDestination, DeviceBuffer};
    use std::sync::Arc;

    const D0: DeviceOrdinal = DeviceOrdinal::new(0);

    fn interface(address: usize, rows: usize, typestr: &str) -> ArrayInterface {
        ArrayInterface {
            data: (address as u64, false),
            shape: vec![rows],
            typestr: typestr.to_string(),
            version: 1,
            mask: None,
            strides: None,
        }
    }

    #[test]
    fn test_parses_descriptions() {
        let parsed = parse_interfaces(
            r#"[{"data": [4096, true], "shape": [2], "typestr": "<i8", "version": 1,
                 "mask": {"data": [8192, true], "shape": [2], "typestr": "|t1"}}]"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].data, (4096, true));
        assert_eq!(parsed[0].mask.as_ref().unwrap().typestr, "|t1");
        assert!(matches!(parse_interfaces("[]"), Err(HdvError::InvalidInput(_))));
        assert!(matches!(parse_interfaces("{"), Err(HdvError::Json(_))));
    }

    #[test]
    fn test_reads_typed_columns() {
        let backend = Arc::new(SimulatedDevice::new(1));
        let ints = DeviceBuffer::from_slice(backend.clone(), D0, &[3i64, -1]).unwrap();
        let doubles = DeviceBuffer::from_slice(backend.clone(), D0, &[0.5f64, f64::NAN]).unwrap();
        let columns = read_columns(
            &*backend,
            D0,
            &[
                interface(ints.as_device_ptr().address(), 2, "<i8"),
                interface(doubles.as_device_ptr().address(), 2, "<f8"),
            ],
        )
        .unwrap();
        assert_eq!(columns[0].get(0), Some(3.0));
        assert_eq!(columns[0].get(1), Some(-1.0));
        assert_eq!(columns[1].get(0), Some(0.5));
        assert_eq!(columns[1].get(1), None);
    }

    #[test]
    fn test_bitmask_hides_rows() {
        let backend = Arc::new(SimulatedDevice::new(1));
        let values = DeviceBuffer::from_slice(backend.clone(), D0, &[1.0f32, 2.0, 3.0]).unwrap();
        let mut mask = DeviceBuffer::from_slice(backend.clone(), D0, &[0u8]).unwrap();
        mask.copy_from(&[0b101u8][..]).unwrap();
        let mut column = interface(values.as_device_ptr().address(), 3, "<f4");
        column.mask = Some(MaskInterface {
            data: (mask.as_device_ptr().address() as u64, false),
            shape: vec![3],
            typestr: "|t1".to_string(),
        });
        let columns = read_columns(&*backend, D0, &[column]).unwrap();
        assert_eq!(columns[0].get(0), Some(1.0));
        assert_eq!(columns[0].get(1), None);
        assert_eq!(columns[0].get(2), Some(3.0));
    }

    #[test]
    fn test_byte_masks_hide_rows() {
        let backend = Arc::new(SimulatedDevice::new(1));
        let values = DeviceBuffer::from_slice(backend.clone(), D0, &[1i32, 2, 3]).unwrap();
        let mask = DeviceBuffer::from_slice(backend.clone(), D0, &[1u8, 0, 7]).unwrap();
        for typestr in &["|i1", "|u1", "|b1"] {
            let mut column = interface(values.as_device_ptr().address(), 3, "<i4");
            column.mask = Some(MaskInterface {
                data: (mask.as_device_ptr().address() as u64, false),
                shape: vec![3],
                typestr: typestr.to_string(),
            });
            let columns = read_columns(&*backend, D0, &[column]).unwrap();
            assert_eq!(columns[0].get(0), Some(1.0));
            assert_eq!(columns[0].get(1), None);
            assert_eq!(columns[0].get(2), Some(3.0));
        }
    }

    #[test]
    fn test_short_mask_is_rejected() {
        let backend = Arc::new(SimulatedDevice::new(1));
        let values = DeviceBuffer::from_slice(backend.clone(), D0, &[1.0f32, 2.0, 3.0]).unwrap();
        let mask = DeviceBuffer::from_slice(backend.clone(), D0, &[1u8, 1]).unwrap();
        let mut column = interface(values.as_device_ptr().address(), 3, "<f4");
        column.mask = Some(MaskInterface {
            data: (mask.as_device_ptr().address() as u64, false),
            shape: vec![2],
            typestr: "|u1".to_string(),
        });
        let result = read_columns(&*backend, D0, &[column]);
        assert!(matches!(result, Err(HdvError::InvalidInput(_))));
    }

    #[test]
    fn test_oversized_shapes_fail_before_reading() {
        let backend = Arc::new(SimulatedDevice::new(1));
        let values = DeviceBuffer::from_slice(backend.clone(), D0, &[1.0f32, 2.0]).unwrap();
        let address = values.as_device_ptr().address();

        let huge = read_columns(&*backend, D0, &[interface(address, 1 << 60, "<f4")]);
        assert!(matches!(huge, Err(HdvError::InvalidAddress { .. })));

        let overflowing = read_columns(&*backend, D0, &[interface(address, usize::MAX, "<f8")]);
        assert!(matches!(overflowing, Err(HdvError::InvalidInput(_))));
        assert_eq!(backend.transfers(D0).device_to_host, 0);
    }

    #[test]
    fn test_rejects_bad_descriptions() {
        let backend = Arc::new(SimulatedDevice::new(1));
        let a = DeviceBuffer::from_slice(backend.clone(), D0, &[1u32, 2]).unwrap();
        let b = DeviceBuffer::from_slice(backend.clone(), D0, &[1u32]).unwrap();
        let a_addr = a.as_device_ptr().address();

        let uneven = read_columns(
            &*backend,
            D0,
            &[interface(a_addr, 2, "<u4"), interface(b.as_device_ptr().address(), 1, "<u4")],
        );
        assert!(matches!(uneven, Err(HdvError::InvalidInput(_))));

        let text = read_columns(&*backend, D0, &[interface(a_addr, 2, "<U8")]);
        assert!(matches!(text, Err(HdvError::InvalidInput(_))));

        let overrun = read_columns(&*backend, D0, &[interface(a_addr, 4, "<u4")]);
        assert!(matches!(overrun, Err(HdvError::InvalidAddress { .. })));
    }
}
