//! CUDA backend for the memory broker (NVIDIA).
//!
//! This module is feature-gated behind `cuda`. Kernels live in
//! `kernels/pack.cu` and are JIT-compiled with NVRTC when the device is
//! opened.
//!
//! # Packing on the device
//!
//! ```text
//! mark_matches                : flags[i] = (predicate[i] == match), flags[n] = 0
//! block_scan                  : exclusive scan inside each 256-thread block
//!   (recurse on block totals)
//! add_block_offsets           : add the scanned block totals back
//! pack_<T> / unpack_<T>       : one thread per original position
//! record_index                : index[offsets[i]] = i
//! unpack_index_<T>            : one thread per packed position
//! ```
//!
//! The exclusive scan makes compaction stable, matching the host path. The
//! scan runs over `n + 1` flags, so `offsets[n]` is the match count.

use crate::memory::Buffer;
use crate::pack::{SparseIndex, check_groups, check_index_range, check_min_len};
use ams_core::{Element, Error, Result, Scalar};
use cudarc::driver::{
    CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, LaunchConfig, PushKernelArg,
};
use cudarc::nvrtc::compile_ptx;
use std::any::TypeId;
use std::sync::Arc;

/// Kernel source, compiled at runtime.
const KERNEL_SRC: &str = include_str!("../kernels/pack.cu");

/// Threads per scan block; equals `AMS_SCAN_BLOCK` in `pack.cu`.
const SCAN_BLOCK: u32 = 256;

fn cuda_err(msg: impl std::fmt::Display) -> Error {
    Error::Computation(format!("CUDA: {msg}"))
}

/// An opened CUDA device with the packing kernels loaded.
pub struct CudaDevice {
    #[allow(dead_code)]
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    module: Arc<CudaModule>,
}

impl CudaDevice {
    /// Check if CUDA is available at runtime (driver loaded, GPU present).
    pub fn is_available() -> bool {
        CudaContext::new(0).is_ok()
    }

    /// Open device `ordinal` and compile the packing kernels.
    pub fn new(ordinal: usize) -> Result<Self> {
        let ctx = CudaContext::new(ordinal).map_err(|e| cuda_err(format!("context: {e}")))?;
        let stream = ctx.default_stream();
        let ptx = compile_ptx(KERNEL_SRC).map_err(|e| cuda_err(format!("NVRTC: {e}")))?;
        let module = ctx.load_module(ptx).map_err(|e| cuda_err(format!("load PTX: {e}")))?;
        Ok(Self { ctx, stream, module })
    }

    fn function(&self, name: &str) -> Result<CudaFunction> {
        self.module.load_function(name).map_err(|e| cuda_err(format!("load {name}: {e}")))
    }

    /// Allocate `len` zeroed elements on the device.
    pub fn alloc_zeros<T: Element>(&self, len: usize) -> Result<CudaSlice<T>> {
        self.stream.alloc_zeros::<T>(len).map_err(cuda_err)
    }

    /// Copy a device slice back to a host vector.
    pub fn download<T: Element>(&self, src: &CudaSlice<T>) -> Result<Vec<T>> {
        let mut host = vec![T::default(); src.len()];
        self.stream.memcpy_dtoh(src, &mut host[..]).map_err(cuda_err)?;
        self.stream.synchronize().map_err(cuda_err)?;
        Ok(host)
    }

    /// Copy a host slice into the front of a device slice.
    pub fn upload<T: Element>(&self, dst: &mut CudaSlice<T>, src: &[T]) -> Result<()> {
        check_min_len("device upload", src.len(), std::iter::once(dst.len()))?;
        self.stream.memcpy_htod(src, &mut dst.slice_mut(..src.len())).map_err(cuda_err)?;
        self.stream.synchronize().map_err(cuda_err)
    }

    /// Copy the first `n` elements of `src` into `dst`, whatever their residencies.
    pub(crate) fn copy<T: Element>(&self, dst: &mut Buffer<T>, src: &Buffer<T>, n: usize) -> Result<()> {
        match (dst, src) {
            (Buffer::Host(d), Buffer::Host(s)) => d[..n].copy_from_slice(&s[..n]),
            (Buffer::Device(d), Buffer::Host(s)) => {
                self.stream.memcpy_htod(&s[..n], &mut d.slice_mut(..n)).map_err(cuda_err)?
            }
            (Buffer::Host(d), Buffer::Device(s)) => {
                self.stream.memcpy_dtoh(&s.slice(..n), &mut d[..n]).map_err(cuda_err)?
            }
            (Buffer::Device(d), Buffer::Device(s)) => {
                self.stream.memcpy_dtod(&s.slice(..n), &mut d.slice_mut(..n)).map_err(cuda_err)?
            }
        }
        self.stream.synchronize().map_err(cuda_err)
    }

    /// In-place exclusive scan of `data[..n]`.
    ///
    /// Each block scans its own tile, the block totals are scanned by the
    /// same routine, and a fix-up pass adds them back.
    fn exclusive_scan(&self, data: &mut CudaSlice<u32>, n: u32) -> Result<()> {
        let blocks = n.div_ceil(SCAN_BLOCK);
        let config =
            LaunchConfig { grid_dim: (blocks, 1, 1), block_dim: (SCAN_BLOCK, 1, 1), shared_mem_bytes: 0 };
        let mut block_sums = self.alloc_zeros::<u32>(blocks as usize)?;
        {
            let func = self.function("block_scan")?;
            let mut builder = self.stream.launch_builder(&func);
            builder.arg(&mut *data);
            builder.arg(&n);
            builder.arg(&mut block_sums);
            unsafe {
                builder.launch(config).map_err(|e| cuda_err(format!("launch block_scan: {e}")))?;
            }
        }
        if blocks > 1 {
            self.exclusive_scan(&mut block_sums, blocks)?;
            let func = self.function("add_block_offsets")?;
            let mut builder = self.stream.launch_builder(&func);
            builder.arg(&mut *data);
            builder.arg(&n);
            builder.arg(&block_sums);
            unsafe {
                builder.launch(config).map_err(|e| cuda_err(format!("launch add_block_offsets: {e}")))?;
            }
        }
        Ok(())
    }

    /// Exclusive scan of the match mask; returns `(offsets, total)`.
    fn offsets(
        &self,
        predicate: &CudaSlice<bool>,
        match_value: bool,
    ) -> Result<(CudaSlice<u32>, usize)> {
        let n32 = launch_len(predicate.len())?;
        let slots = n32 + 1;
        let mut offsets = self.alloc_zeros::<u32>(slots as usize)?;
        if n32 > 0 {
            let func = self.function("mark_matches")?;
            let mv = match_value as i32;
            let mut builder = self.stream.launch_builder(&func);
            builder.arg(predicate);
            builder.arg(&n32);
            builder.arg(&mv);
            builder.arg(&mut offsets);
            unsafe {
                builder
                    .launch(LaunchConfig::for_num_elems(n32))
                    .map_err(|e| cuda_err(format!("launch mark_matches: {e}")))?;
            }
        }
        self.exclusive_scan(&mut offsets, slots)?;
        let mut host_total = [0u32; 1];
        self.stream
            .memcpy_dtoh(&offsets.slice(n32 as usize..), &mut host_total[..])
            .map_err(cuda_err)?;
        self.stream.synchronize().map_err(cuda_err)?;
        Ok((offsets, host_total[0] as usize))
    }

    /// Device counterpart of [`crate::pack::pack`] / [`crate::pack::pack_with_index`].
    pub(crate) fn pack<T: Scalar>(
        &self,
        predicate: &CudaSlice<bool>,
        sparse: &[&CudaSlice<T>],
        dense: &mut [&mut CudaSlice<T>],
        index: Option<&mut CudaSlice<SparseIndex>>,
        match_value: bool,
    ) -> Result<usize> {
        check_groups(sparse.len(), dense.len())?;
        let n = predicate.len();
        let n32 = launch_len(n)?;
        check_min_len("sparse array", n, sparse.iter().map(|a| a.len()))?;
        let (offsets, count) = self.offsets(predicate, match_value)?;
        check_min_len("dense array", count, dense.iter().map(|a| a.len()))?;
        if let Some(index) = &index {
            check_min_len("sparse index", count, std::iter::once(index.len()))?;
        }
        if n == 0 {
            return Ok(0);
        }

        let config = LaunchConfig::for_num_elems(n32);
        let mv = match_value as i32;
        let func = self.function(&format!("pack_{}", T::DEVICE_SUFFIX))?;
        for (s, d) in sparse.iter().zip(dense.iter_mut()) {
            let mut builder = self.stream.launch_builder(&func);
            builder.arg(predicate);
            builder.arg(&offsets);
            builder.arg(&n32);
            builder.arg(&mv);
            builder.arg(*s);
            builder.arg(&mut **d);
            unsafe {
                builder.launch(config).map_err(|e| cuda_err(format!("launch pack: {e}")))?;
            }
        }
        if let Some(index) = index {
            let func = self.function("record_index")?;
            let mut builder = self.stream.launch_builder(&func);
            builder.arg(predicate);
            builder.arg(&offsets);
            builder.arg(&n32);
            builder.arg(&mv);
            builder.arg(index);
            unsafe {
                builder.launch(config).map_err(|e| cuda_err(format!("launch record_index: {e}")))?;
            }
        }
        self.stream.synchronize().map_err(cuda_err)?;
        Ok(count)
    }

    /// Device counterpart of [`crate::pack::unpack`].
    pub(crate) fn unpack<T: Scalar>(
        &self,
        predicate: &CudaSlice<bool>,
        dense: &[&CudaSlice<T>],
        sparse: &mut [&mut CudaSlice<T>],
        match_value: bool,
    ) -> Result<()> {
        check_groups(sparse.len(), dense.len())?;
        let n = predicate.len();
        let n32 = launch_len(n)?;
        check_min_len("sparse array", n, sparse.iter().map(|a| a.len()))?;
        let (offsets, count) = self.offsets(predicate, match_value)?;
        check_min_len("dense array", count, dense.iter().map(|a| a.len()))?;
        if n == 0 {
            return Ok(());
        }

        let config = LaunchConfig::for_num_elems(n32);
        let mv = match_value as i32;
        let func = self.function(&format!("unpack_{}", T::DEVICE_SUFFIX))?;
        for (d, s) in dense.iter().zip(sparse.iter_mut()) {
            let mut builder = self.stream.launch_builder(&func);
            builder.arg(predicate);
            builder.arg(&offsets);
            builder.arg(&n32);
            builder.arg(&mv);
            builder.arg(*d);
            builder.arg(&mut **s);
            unsafe {
                builder.launch(config).map_err(|e| cuda_err(format!("launch unpack: {e}")))?;
            }
        }
        self.stream.synchronize().map_err(cuda_err)
    }

    /// Device counterpart of [`crate::pack::unpack_with_index`].
    pub(crate) fn unpack_with_index<T: Scalar>(
        &self,
        index: &CudaSlice<SparseIndex>,
        npacked: usize,
        dense: &[&CudaSlice<T>],
        sparse: &mut [&mut CudaSlice<T>],
    ) -> Result<()> {
        check_groups(sparse.len(), dense.len())?;
        let np32 = launch_len(npacked)?;
        check_min_len("sparse index", npacked, std::iter::once(index.len()))?;
        check_min_len("dense array", npacked, dense.iter().map(|a| a.len()))?;
        if npacked == 0 {
            return Ok(());
        }
        // Bounds of the scatter targets are checked on the host copy of the index.
        let host_index = self.download(index)?;
        if let Some(&max) = host_index[..npacked].iter().max() {
            check_min_len("sparse array", max as usize + 1, sparse.iter().map(|a| a.len()))?;
        }

        let config = LaunchConfig::for_num_elems(np32);
        let func = self.function(&format!("unpack_index_{}", T::DEVICE_SUFFIX))?;
        for (d, s) in dense.iter().zip(sparse.iter_mut()) {
            let mut builder = self.stream.launch_builder(&func);
            builder.arg(index);
            builder.arg(&np32);
            builder.arg(*d);
            builder.arg(&mut **s);
            unsafe {
                builder.launch(config).map_err(|e| cuda_err(format!("launch unpack_index: {e}")))?;
            }
        }
        self.stream.synchronize().map_err(cuda_err)
    }

    /// Interleave device features into `[n][features.len()]` row-major order.
    ///
    /// One strided column scatter per feature. The element type is kept, so
    /// `T` and `W` must be the same type.
    pub(crate) fn linearize<T: Scalar, W: Scalar>(
        &self,
        n: usize,
        features: &[&CudaSlice<T>],
    ) -> Result<CudaSlice<W>> {
        if TypeId::of::<T>() != TypeId::of::<W>() {
            return Err(Error::Unsupported("device linearization does not convert element types".into()));
        }
        let nfeatures = features.len();
        let n32 = launch_len(n)?;
        check_index_range(n.saturating_mul(nfeatures))?;
        check_min_len("linearize feature", n, features.iter().map(|f| f.len()))?;
        let mut out = self.alloc_zeros::<W>(n * nfeatures)?;
        if n == 0 {
            return Ok(out);
        }

        let config = LaunchConfig::for_num_elems(n32);
        let nf32 = nfeatures as u32;
        let func = self.function(&format!("interleave_{}", T::DEVICE_SUFFIX))?;
        for (f, feature) in features.iter().enumerate() {
            let f32_ = f as u32;
            let mut builder = self.stream.launch_builder(&func);
            builder.arg(*feature);
            builder.arg(&n32);
            builder.arg(&nf32);
            builder.arg(&f32_);
            builder.arg(&mut out);
            unsafe {
                builder.launch(config).map_err(|e| cuda_err(format!("launch interleave: {e}")))?;
            }
        }
        self.stream.synchronize().map_err(cuda_err)?;
        Ok(out)
    }
}

/// `n` as a kernel length. The scan's trailing total slot must fit as well.
fn launch_len(n: usize) -> Result<u32> {
    check_index_range(n.saturating_add(2))?;
    Ok(n as u32)
}
