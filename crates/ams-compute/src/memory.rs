//! Residency-aware memory broker.
//!
//! Hides host/device placement and element-type differences from the rest of
//! the pipeline:
//! - [`Buffer`] tags its storage with a [`Residency`] at allocation time;
//! - [`MemoryBroker`] allocates, copies between residencies, linearizes
//!   feature arrays and dispatches packing to the host loop or the device
//!   kernels according to that tag;
//! - [`cast`] / [`cast_back`] convert between a caller's element type and
//!   the working type, borrowing instead of copying when they coincide;
//! - [`partition_size`] bounds how many elements fit a scratch budget.
//!
//! Whether a device is available is decided once, in [`MemoryBroker::new`].

use crate::pack::{self, SparseIndex};
use ams_core::{Element, Error, Residency, Result, Scalar};
use rayon::prelude::*;
use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "cuda")]
use crate::cuda::CudaDevice;
#[cfg(feature = "cuda")]
use cudarc::driver::CudaSlice;

/// A typed buffer whose variant records where its storage lives.
pub enum Buffer<T: Element> {
    /// Host memory.
    Host(Vec<T>),
    /// Device memory.
    #[cfg(feature = "cuda")]
    Device(CudaSlice<T>),
}

impl<T: Element> Buffer<T> {
    /// Wrap an existing host vector.
    pub fn from_host(data: Vec<T>) -> Self {
        Buffer::Host(data)
    }

    /// Residency tag of this buffer.
    pub fn residency(&self) -> Residency {
        match self {
            Buffer::Host(_) => Residency::Host,
            #[cfg(feature = "cuda")]
            Buffer::Device(_) => Residency::Device,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Buffer::Host(v) => v.len(),
            #[cfg(feature = "cuda")]
            Buffer::Device(d) => d.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Host contents, or `None` for a device buffer.
    pub fn as_host(&self) -> Option<&[T]> {
        match self {
            Buffer::Host(v) => Some(v),
            #[cfg(feature = "cuda")]
            Buffer::Device(_) => None,
        }
    }

    /// Mutable host contents, or `None` for a device buffer.
    pub fn as_host_mut(&mut self) -> Option<&mut [T]> {
        match self {
            Buffer::Host(v) => Some(v),
            #[cfg(feature = "cuda")]
            Buffer::Device(_) => None,
        }
    }

    /// Host contents; `Error::Validation` for a device buffer.
    pub fn host(&self) -> Result<&[T]> {
        self.as_host().ok_or_else(|| Error::Validation("expected a host-resident buffer".into()))
    }

    /// Mutable host contents; `Error::Validation` for a device buffer.
    pub fn host_mut(&mut self) -> Result<&mut [T]> {
        self.as_host_mut()
            .ok_or_else(|| Error::Validation("expected a host-resident buffer".into()))
    }

    #[cfg(feature = "cuda")]
    pub(crate) fn device(&self) -> Result<&CudaSlice<T>> {
        match self {
            Buffer::Device(d) => Ok(d),
            Buffer::Host(_) => Err(Error::Validation("expected a device-resident buffer".into())),
        }
    }

    #[cfg(feature = "cuda")]
    pub(crate) fn device_mut(&mut self) -> Result<&mut CudaSlice<T>> {
        match self {
            Buffer::Device(d) => Ok(d),
            Buffer::Host(_) => Err(Error::Validation("expected a device-resident buffer".into())),
        }
    }
}

impl<T: Element> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("residency", &self.residency()).field("len", &self.len()).finish()
    }
}

/// Direction of a cross-residency copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    /// Host → host.
    HostToHost,
    /// Host → device.
    HostToDevice,
    /// Device → host.
    DeviceToHost,
    /// Device → device.
    DeviceToDevice,
}

impl CopyKind {
    /// Residencies of `(destination, source)`.
    pub fn residencies(self) -> (Residency, Residency) {
        match self {
            CopyKind::HostToHost => (Residency::Host, Residency::Host),
            CopyKind::HostToDevice => (Residency::Device, Residency::Host),
            CopyKind::DeviceToHost => (Residency::Host, Residency::Device),
            CopyKind::DeviceToDevice => (Residency::Device, Residency::Device),
        }
    }

    /// Whether either side is device memory.
    pub fn involves_device(self) -> bool {
        self != CopyKind::HostToHost
    }
}

#[cold]
fn missing_device(what: &str) -> ! {
    log::error!("{what} requires accelerator support, but this memory broker has none");
    panic!("{what} requires accelerator support, but this memory broker has none");
}

/// Allocator and data mover for host and (optionally) device buffers.
pub struct MemoryBroker {
    #[cfg(feature = "cuda")]
    device: Option<CudaDevice>,
    allocations: AtomicUsize,
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("has_device", &self.has_device())
            .field("allocations", &self.allocation_count())
            .finish()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::host()
    }
}

impl MemoryBroker {
    /// Host-only broker. Any device-involving copy on it is fatal.
    pub fn host() -> Self {
        Self {
            #[cfg(feature = "cuda")]
            device: None,
            allocations: AtomicUsize::new(0),
        }
    }

    /// Broker with device capability if `device` is set.
    ///
    /// Fails with `Error::Unsupported` on builds without the `cuda` feature.
    pub fn new(device: bool) -> Result<Self> {
        if !device {
            return Ok(Self::host());
        }
        #[cfg(feature = "cuda")]
        {
            let device = CudaDevice::new(0)?;
            log::info!("memory broker: CUDA device 0 ready");
            Ok(Self { device: Some(device), allocations: AtomicUsize::new(0) })
        }
        #[cfg(not(feature = "cuda"))]
        {
            Err(Error::Unsupported("device memory requested, but built without the `cuda` feature".into()))
        }
    }

    /// Check if a CUDA device is usable at runtime (always false without `cuda`).
    pub fn device_available() -> bool {
        #[cfg(feature = "cuda")]
        {
            CudaDevice::is_available()
        }
        #[cfg(not(feature = "cuda"))]
        {
            false
        }
    }

    /// Whether this broker can touch device memory.
    pub fn has_device(&self) -> bool {
        #[cfg(feature = "cuda")]
        {
            self.device.is_some()
        }
        #[cfg(not(feature = "cuda"))]
        {
            false
        }
    }

    #[cfg(feature = "cuda")]
    fn cuda(&self, what: &str) -> &CudaDevice {
        match &self.device {
            Some(device) => device,
            None => missing_device(what),
        }
    }

    fn record_allocation<T>(&self, residency: Residency, len: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        log::trace!("memory broker: allocate {len} x {} on {residency}", std::any::type_name::<T>());
    }

    /// Number of buffers allocated through this broker.
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Allocate `len` zeroed elements with the given residency.
    ///
    /// # Panics
    ///
    /// Panics on a device allocation when the broker has no device.
    pub fn allocate<T: Element>(&self, residency: Residency, len: usize) -> Result<Buffer<T>> {
        self.record_allocation::<T>(residency, len);
        match residency {
            Residency::Host => Ok(Buffer::Host(vec![T::default(); len])),
            Residency::Device => {
                #[cfg(feature = "cuda")]
                {
                    Ok(Buffer::Device(self.cuda("device allocation").alloc_zeros(len)?))
                }
                #[cfg(not(feature = "cuda"))]
                {
                    missing_device("device allocation")
                }
            }
        }
    }

    /// Copy a host slice into a new buffer with the given residency.
    pub fn upload<T: Element>(&self, residency: Residency, data: &[T]) -> Result<Buffer<T>> {
        match residency {
            Residency::Host => {
                self.record_allocation::<T>(residency, data.len());
                Ok(Buffer::Host(data.to_vec()))
            }
            #[cfg(feature = "cuda")]
            Residency::Device => {
                let device = self.cuda("device upload");
                self.record_allocation::<T>(residency, data.len());
                let mut d = device.alloc_zeros(data.len())?;
                device.upload(&mut d, data)?;
                Ok(Buffer::Device(d))
            }
            #[cfg(not(feature = "cuda"))]
            Residency::Device => missing_device("device upload"),
        }
    }

    /// Copy a buffer's contents into a host vector.
    pub fn download<T: Element>(&self, buffer: &Buffer<T>) -> Result<Vec<T>> {
        match buffer {
            Buffer::Host(v) => Ok(v.clone()),
            #[cfg(feature = "cuda")]
            Buffer::Device(d) => self.cuda("device download").download(d),
        }
    }

    /// Copy the first `byte_count` bytes of `src` into `dst`.
    ///
    /// `byte_count` must be a whole number of elements that fits both buffers,
    /// and the buffers' residencies must match `kind`.
    ///
    /// # Panics
    ///
    /// Panics if `kind` involves device memory and the broker has no device.
    /// This is a configuration error: callers must not request device copies
    /// unless accelerator support is present.
    pub fn copy<T: Element>(
        &self,
        kind: CopyKind,
        dst: &mut Buffer<T>,
        src: &Buffer<T>,
        byte_count: usize,
    ) -> Result<()> {
        if kind.involves_device() && !self.has_device() {
            missing_device(&format!("{kind:?} copy"));
        }
        let (dst_res, src_res) = kind.residencies();
        if dst.residency() != dst_res || src.residency() != src_res {
            return Err(Error::Validation(format!(
                "{kind:?} copy between {} destination and {} source",
                dst.residency(),
                src.residency()
            )));
        }
        let elem = std::mem::size_of::<T>();
        if elem == 0 || byte_count % elem != 0 {
            return Err(Error::Validation(format!(
                "byte count {byte_count} is not a multiple of the element size {elem}"
            )));
        }
        let n = byte_count / elem;
        if src.len() < n {
            return Err(Error::SizeMismatch { what: "copy source", expected: n, actual: src.len() });
        }
        if dst.len() < n {
            return Err(Error::SizeMismatch { what: "copy destination", expected: n, actual: dst.len() });
        }

        match (dst, src) {
            (Buffer::Host(d), Buffer::Host(s)) => {
                d[..n].copy_from_slice(&s[..n]);
                Ok(())
            }
            #[cfg(feature = "cuda")]
            (dst, src) => self.cuda("device copy").copy(dst, src, n),
        }
    }

    /// Interleave `features` into one `[n][features.len()]` row-major buffer.
    ///
    /// The result has the residency of `features[0]`. Host features may have
    /// any scalar type and are converted to `W`; the device path keeps the
    /// element type, so it requires `T == W`.
    pub fn linearize<T: Scalar, W: Scalar>(&self, n: usize, features: &[&Buffer<T>]) -> Result<Buffer<W>> {
        let first = features
            .first()
            .ok_or_else(|| Error::Validation("linearize needs at least one feature".into()))?;
        let residency = first.residency();
        if let Some(other) = features.iter().find(|f| f.residency() != residency) {
            return Err(Error::Validation(format!(
                "linearize features mix {residency} and {} buffers",
                other.residency()
            )));
        }
        self.allocations.fetch_add(1, Ordering::Relaxed);
        match residency {
            Residency::Host => {
                let slices = features.iter().map(|f| f.host()).collect::<Result<Vec<_>>>()?;
                Ok(Buffer::Host(linearize_host(n, &slices)?))
            }
            Residency::Device => {
                #[cfg(feature = "cuda")]
                {
                    let slices = features.iter().map(|f| f.device()).collect::<Result<Vec<_>>>()?;
                    Ok(Buffer::Device(self.cuda("device linearize").linearize::<T, W>(n, &slices)?))
                }
                #[cfg(not(feature = "cuda"))]
                {
                    missing_device("device linearize")
                }
            }
        }
    }

    /// [`pack::pack`] over buffers, dispatched by the predicate's residency.
    pub fn pack<T: Scalar>(
        &self,
        predicate: &Buffer<bool>,
        sparse: &[&Buffer<T>],
        dense: &mut [&mut Buffer<T>],
        match_value: bool,
    ) -> Result<usize> {
        match predicate {
            Buffer::Host(p) => {
                let s = host_slices(sparse)?;
                let mut d = host_slices_mut(dense)?;
                pack::pack(p, &s, &mut d, match_value)
            }
            #[cfg(feature = "cuda")]
            Buffer::Device(p) => {
                let s = device_slices(sparse)?;
                let mut d = device_slices_mut(dense)?;
                self.cuda("device pack").pack(p, &s, &mut d, None, match_value)
            }
        }
    }

    /// [`pack::pack_with_index`] over buffers, dispatched by the predicate's residency.
    pub fn pack_with_index<T: Scalar>(
        &self,
        predicate: &Buffer<bool>,
        index: &mut Buffer<SparseIndex>,
        sparse: &[&Buffer<T>],
        dense: &mut [&mut Buffer<T>],
        match_value: bool,
    ) -> Result<usize> {
        match predicate {
            Buffer::Host(p) => {
                let s = host_slices(sparse)?;
                let mut d = host_slices_mut(dense)?;
                pack::pack_with_index(p, index.host_mut()?, &s, &mut d, match_value)
            }
            #[cfg(feature = "cuda")]
            Buffer::Device(p) => {
                let s = device_slices(sparse)?;
                let mut d = device_slices_mut(dense)?;
                let index = index.device_mut()?;
                self.cuda("device pack").pack(p, &s, &mut d, Some(index), match_value)
            }
        }
    }

    /// [`pack::unpack`] over buffers, dispatched by the predicate's residency.
    pub fn unpack<T: Scalar>(
        &self,
        predicate: &Buffer<bool>,
        dense: &[&Buffer<T>],
        sparse: &mut [&mut Buffer<T>],
        match_value: bool,
    ) -> Result<()> {
        match predicate {
            Buffer::Host(p) => {
                let d = host_slices(dense)?;
                let mut s = host_slices_mut(sparse)?;
                pack::unpack(p, &d, &mut s, match_value)
            }
            #[cfg(feature = "cuda")]
            Buffer::Device(p) => {
                let d = device_slices(dense)?;
                let mut s = device_slices_mut(sparse)?;
                self.cuda("device unpack").unpack(p, &d, &mut s, match_value)
            }
        }
    }

    /// [`pack::unpack_with_index`] over buffers, dispatched by the index's residency.
    pub fn unpack_with_index<T: Scalar>(
        &self,
        index: &Buffer<SparseIndex>,
        npacked: usize,
        dense: &[&Buffer<T>],
        sparse: &mut [&mut Buffer<T>],
    ) -> Result<()> {
        match index {
            Buffer::Host(idx) => {
                let d = host_slices(dense)?;
                let mut s = host_slices_mut(sparse)?;
                pack::unpack_with_index(idx, npacked, &d, &mut s)
            }
            #[cfg(feature = "cuda")]
            Buffer::Device(idx) => {
                let d = device_slices(dense)?;
                let mut s = device_slices_mut(sparse)?;
                self.cuda("device unpack").unpack_with_index(idx, npacked, &d, &mut s)
            }
        }
    }
}

fn host_slices<'a, T: Element>(buffers: &[&'a Buffer<T>]) -> Result<Vec<&'a [T]>> {
    buffers.iter().map(|b| b.host()).collect()
}

fn host_slices_mut<'a, T: Element>(buffers: &'a mut [&mut Buffer<T>]) -> Result<Vec<&'a mut [T]>> {
    buffers.iter_mut().map(|b| b.host_mut()).collect()
}

#[cfg(feature = "cuda")]
fn device_slices<'a, T: Element>(buffers: &[&'a Buffer<T>]) -> Result<Vec<&'a CudaSlice<T>>> {
    buffers.iter().map(|b| b.device()).collect()
}

#[cfg(feature = "cuda")]
fn device_slices_mut<'a, T: Element>(
    buffers: &'a mut [&mut Buffer<T>],
) -> Result<Vec<&'a mut CudaSlice<T>>> {
    buffers.iter_mut().map(|b| b.device_mut()).collect()
}

/// View `src` as the working type `W`.
///
/// When `S` and `W` are the same type this borrows `src` (no allocation, no
/// copy). Otherwise it returns a freshly allocated, element-wise converted
/// vector whose lifetime is independent of `src`.
pub fn cast<S: Scalar, W: Scalar>(src: &[S]) -> Cow<'_, [W]> {
    if TypeId::of::<S>() == TypeId::of::<W>() {
        // SAFETY: S and W are the same type, so layout and validity agree.
        let view = unsafe { std::slice::from_raw_parts(src.as_ptr().cast::<W>(), src.len()) };
        Cow::Borrowed(view)
    } else {
        Cow::Owned(src.par_iter().map(|&v| W::from_f64(v.to_f64())).collect())
    }
}

/// Convert a working-type buffer back into a caller-owned destination.
pub fn cast_back<S: Scalar, W: Scalar>(dst: &mut [S], src: &[W]) -> Result<()> {
    if dst.len() != src.len() {
        return Err(Error::SizeMismatch { what: "cast_back", expected: src.len(), actual: dst.len() });
    }
    dst.par_iter_mut().zip(src.par_iter()).for_each(|(d, &s)| *d = S::from_f64(s.to_f64()));
    Ok(())
}

/// Host linearization: `out[i * F + f] = features[f][i]` for `i < n`.
pub fn linearize_host<T: Scalar, W: Scalar>(n: usize, features: &[&[T]]) -> Result<Vec<W>> {
    let nfeatures = features.len();
    if nfeatures == 0 {
        return Err(Error::Validation("linearize needs at least one feature".into()));
    }
    for f in features {
        if f.len() < n {
            return Err(Error::SizeMismatch { what: "linearize feature", expected: n, actual: f.len() });
        }
    }
    let mut out = vec![W::default(); n * nfeatures];
    out.par_chunks_mut(nfeatures).enumerate().for_each(|(i, row)| {
        for (v, f) in row.iter_mut().zip(features) {
            *v = W::from_f64(f[i].to_f64());
        }
    });
    Ok(out)
}

/// Maximum element count whose footprint fits `budget_bytes`.
///
/// Each element costs `(input_fields + output_fields) * size_of::<W>()` bytes,
/// plus one [`SparseIndex`] when `include_index` is set. With a zero
/// footprint every element fits and the budget itself is returned.
pub fn partition_size<W>(
    input_fields: usize,
    output_fields: usize,
    include_index: bool,
    budget_bytes: usize,
) -> usize {
    let mut element_bytes = (input_fields + output_fields) * std::mem::size_of::<W>();
    if include_index {
        element_bytes += std::mem::size_of::<SparseIndex>();
    }
    if element_bytes == 0 {
        return budget_bytes;
    }
    budget_bytes / element_bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_cast_same_type_borrows() {
        let data = vec![1.0f64, 2.0, 3.0];
        let view = cast::<f64, f64>(&data);
        assert!(matches!(view, Cow::Borrowed(_)));
        assert_eq!(view.as_ptr(), data.as_ptr());
    }

    #[test]
    fn test_cast_converts_and_owns() {
        let data = vec![1.5f32, -2.25, 3.0];
        let view = cast::<f32, f64>(&data);
        assert!(matches!(view, Cow::Owned(_)));
        let owned = view.into_owned();
        drop(data);
        assert_eq!(owned, vec![1.5, -2.25, 3.0]);
    }

    #[test]
    fn test_cast_back_round_trip() {
        let src = vec![0.5f32, 1.25, -4.0];
        let working = cast::<f32, f64>(&src);
        let mut dst = vec![0.0f32; 3];
        cast_back(&mut dst, &working).unwrap();
        assert_eq!(dst, src);
        assert!(cast_back(&mut dst[..2], &working).is_err());
    }

    #[test]
    fn test_linearize_host_row_major() {
        let a = [1.0f64, 2.0, 3.0];
        let b = [10.0f64, 20.0, 30.0];
        let out: Vec<f64> = linearize_host(3, &[&a, &b]).unwrap();
        assert_eq!(out, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
    }

    #[test]
    fn test_linearize_converts_type() {
        let a = [1i32, 2];
        let out: Vec<f32> = linearize_host(2, &[&a]).unwrap();
        assert_relative_eq!(out[1], 2.0);
    }

    #[test]
    fn test_linearize_rejects_short_feature() {
        let a = [1.0f64, 2.0];
        let b = [1.0f64];
        assert!(matches!(
            linearize_host::<f64, f64>(2, &[&a, &b]),
            Err(Error::SizeMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(linearize_host::<f64, f64>(2, &[]).is_err());
    }

    #[test]
    fn test_broker_linearize_host_dispatch() {
        let broker = MemoryBroker::host();
        let a = Buffer::from_host(vec![1.0f64, 2.0]);
        let b = Buffer::from_host(vec![3.0f64, 4.0]);
        let out: Buffer<f64> = broker.linearize(2, &[&a, &b]).unwrap();
        assert_eq!(out.residency(), Residency::Host);
        assert_eq!(out.host().unwrap(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_host_copy() {
        let broker = MemoryBroker::host();
        let src = Buffer::from_host(vec![1u32, 2, 3, 4]);
        let mut dst = broker.allocate::<u32>(Residency::Host, 4).unwrap();
        broker.copy(CopyKind::HostToHost, &mut dst, &src, 2 * 4).unwrap();
        assert_eq!(dst.host().unwrap(), &[1, 2, 0, 0]);
        assert_eq!(broker.allocation_count(), 1);
    }

    #[test]
    fn test_copy_rejects_partial_elements_and_overflow() {
        let broker = MemoryBroker::host();
        let src = Buffer::from_host(vec![1.0f64; 2]);
        let mut dst = Buffer::from_host(vec![0.0f64; 2]);
        assert!(matches!(
            broker.copy(CopyKind::HostToHost, &mut dst, &src, 5),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            broker.copy(CopyKind::HostToHost, &mut dst, &src, 24),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "requires accelerator support")]
    fn test_device_copy_without_device_is_fatal() {
        let broker = MemoryBroker::host();
        let src = Buffer::from_host(vec![1.0f64; 2]);
        let mut dst = Buffer::from_host(vec![0.0f64; 2]);
        let _ = broker.copy(CopyKind::HostToDevice, &mut dst, &src, 16);
    }

    #[test]
    fn test_upload_download_host() {
        let broker = MemoryBroker::host();
        let buf = broker.upload(Residency::Host, &[true, false, true]).unwrap();
        assert_eq!(buf.residency(), Residency::Host);
        assert_eq!(broker.allocation_count(), 1);
        assert_eq!(broker.download(&buf).unwrap(), vec![true, false, true]);
    }

    #[test]
    #[cfg(not(feature = "cuda"))]
    #[should_panic(expected = "requires accelerator support")]
    fn test_device_upload_without_device_is_fatal() {
        let _ = MemoryBroker::host().upload(Residency::Device, &[1.0f64, 2.0]);
    }

    #[test]
    #[cfg(not(feature = "cuda"))]
    fn test_device_broker_unsupported_without_cuda() {
        assert!(matches!(MemoryBroker::new(true), Err(Error::Unsupported(_))));
        assert!(!MemoryBroker::device_available());
        assert!(!MemoryBroker::new(false).unwrap().has_device());
    }

    #[test]
    fn test_broker_pack_host_dispatch() {
        let broker = MemoryBroker::host();
        let pred = Buffer::from_host(vec![false, true, true]);
        let a = Buffer::from_host(vec![1.0f64, 2.0, 3.0]);
        let mut d = broker.allocate::<f64>(Residency::Host, 3).unwrap();
        let mut index = broker.allocate::<SparseIndex>(Residency::Host, 3).unwrap();
        let n = broker.pack_with_index(&pred, &mut index, &[&a], &mut [&mut d], true).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&index.host().unwrap()[..n], &[1, 2]);

        let mut out = Buffer::from_host(vec![0.0f64; 3]);
        broker.unpack_with_index(&index, n, &[&d], &mut [&mut out]).unwrap();
        assert_eq!(out.host().unwrap(), &[0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_partition_size_examples() {
        // 2 inputs + 4 outputs of f64 = 48 bytes, + 4 bytes of index.
        assert_eq!(partition_size::<f64>(2, 4, true, 1 << 24), (1 << 24) / 52);
        assert_eq!(partition_size::<f64>(2, 4, false, 1 << 24), (1 << 24) / 48);
        assert_eq!(partition_size::<f32>(1, 1, false, 7), 0);
        assert_eq!(partition_size::<f64>(0, 0, false, 100), 100);
    }

    proptest! {
        #[test]
        fn prop_partition_fits_budget(
            inputs in 0usize..16,
            outputs in 0usize..16,
            include_index in any::<bool>(),
            budget in 0usize..(1 << 26),
        ) {
            let n = partition_size::<f64>(inputs, outputs, include_index, budget);
            let per = (inputs + outputs) * 8 + if include_index { 4 } else { 0 };
            if per > 0 {
                prop_assert!(n * per <= budget);
            }
            let more = partition_size::<f64>(inputs + 1, outputs, include_index, budget);
            prop_assert!(more <= n);
        }
    }
}
