//! Decoded pixel buffers and the reference slots that hold them
//!
//! Planes are padded to whole macroblocks. A [`RasterHandle`] shares one
//! raster between any number of reference slots and external holders;
//! writing through a handle clones the raster first when it is shared, so a
//! published reference is never modified in place.

use std::ops::Deref;
use std::sync::Arc;

use super::header::InterFrameHeader;
use super::tables::ReferenceFrame;
use crate::error::{Error, Result};
use crate::util::Fingerprinter;

/// One 8-bit image plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Plane {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row stride in bytes
    pub fn stride(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Pixel read with coordinates clamped to the plane, which behaves like
    /// an infinitely replicated border
    #[inline]
    pub fn clamped(&self, x: isize, y: isize) -> u8 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Copy a `size`x`size` block at the same position from another plane
    pub fn copy_block_from(&mut self, other: &Plane, x: usize, y: usize, size: usize) {
        for row in y..y + size {
            let start = row * self.width + x;
            self.data[start..start + size].copy_from_slice(&other.data[start..start + size]);
        }
    }
}

/// A decoded YUV 4:2:0 frame, padded to whole macroblocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    display_width: u16,
    display_height: u16,
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
}

impl Raster {
    pub fn new(display_width: u16, display_height: u16) -> Self {
        let mb_cols = (display_width as usize + 15) / 16;
        let mb_rows = (display_height as usize + 15) / 16;
        Raster {
            display_width,
            display_height,
            y: Plane::new(mb_cols * 16, mb_rows * 16),
            u: Plane::new(mb_cols * 8, mb_rows * 8),
            v: Plane::new(mb_cols * 8, mb_rows * 8),
        }
    }

    pub fn display_width(&self) -> u16 {
        self.display_width
    }

    pub fn display_height(&self) -> u16 {
        self.display_height
    }

    pub fn macroblock_width(&self) -> usize {
        self.y.width / 16
    }

    pub fn macroblock_height(&self) -> usize {
        self.y.height / 16
    }

    /// Copy the co-located macroblock of all three planes from `other`
    pub fn copy_macroblock_from(&mut self, other: &Raster, column: usize, row: usize) {
        self.y.copy_block_from(&other.y, column * 16, row * 16, 16);
        self.u.copy_block_from(&other.u, column * 8, row * 8, 8);
        self.v.copy_block_from(&other.v, column * 8, row * 8, 8);
    }

    /// Fingerprint of the full padded planes
    pub fn fingerprint(&self) -> u64 {
        let mut fp = Fingerprinter::new();
        fp.update(&self.display_width.to_le_bytes())
            .update(&self.display_height.to_le_bytes())
            .update(&self.y.data)
            .update(&self.u.data)
            .update(&self.v.data);
        fp.finish()
    }

    /// Planar I420 bytes cropped to the display size
    pub fn to_i420(&self) -> Vec<u8> {
        let width = self.display_width as usize;
        let height = self.display_height as usize;
        let chroma_width = (width + 1) / 2;
        let chroma_height = (height + 1) / 2;

        let mut out = Vec::with_capacity(width * height + 2 * chroma_width * chroma_height);
        for y in 0..height {
            out.extend_from_slice(&self.y.row(y)[..width]);
        }
        for plane in [&self.u, &self.v] {
            for y in 0..chroma_height {
                out.extend_from_slice(&plane.row(y)[..chroma_width]);
            }
        }
        out
    }
}

/// Shared, copy-on-write handle to a raster
#[derive(Debug, Clone)]
pub struct RasterHandle(Arc<Raster>);

impl RasterHandle {
    pub fn new(raster: Raster) -> Self {
        RasterHandle(Arc::new(raster))
    }

    /// Whether anything else holds this raster
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }

    /// Mutable access, cloning the raster first when it is shared
    pub fn make_mut(&mut self) -> &mut Raster {
        Arc::make_mut(&mut self.0)
    }

    pub fn ptr_eq(&self, other: &RasterHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for RasterHandle {
    type Target = Raster;

    fn deref(&self) -> &Raster {
        &self.0
    }
}

const MAX_POOLED: usize = 4;

/// Recycles rasters nobody references any more
#[derive(Debug)]
pub struct RasterPool {
    display_width: u16,
    display_height: u16,
    free: Vec<RasterHandle>,
}

impl RasterPool {
    pub fn new(display_width: u16, display_height: u16) -> Self {
        RasterPool {
            display_width,
            display_height,
            free: Vec::new(),
        }
    }

    /// An unshared raster; its previous contents are unspecified
    pub fn acquire(&mut self) -> RasterHandle {
        match self.free.iter().position(|handle| !handle.is_shared()) {
            Some(index) => self.free.swap_remove(index),
            None => RasterHandle::new(Raster::new(self.display_width, self.display_height)),
        }
    }

    /// Return a handle to the pool; shared handles are simply dropped
    pub fn recycle(&mut self, handle: RasterHandle) {
        if !handle.is_shared() && self.free.len() < MAX_POOLED {
            self.free.push(handle);
        }
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }
}

/// The three reference slots of a decoder
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    pub last: Option<RasterHandle>,
    pub golden: Option<RasterHandle>,
    pub alternate: Option<RasterHandle>,
}

impl ReferenceSet {
    pub fn get(&self, reference: ReferenceFrame) -> Option<&RasterHandle> {
        match reference {
            ReferenceFrame::Last => self.last.as_ref(),
            ReferenceFrame::Golden => self.golden.as_ref(),
            ReferenceFrame::Alternate => self.alternate.as_ref(),
        }
    }

    /// The raster in a slot, or a logic error if the slot was never filled
    pub fn require(&self, reference: ReferenceFrame) -> Result<&RasterHandle> {
        self.get(reference)
            .ok_or_else(|| Error::logic(format!("reference slot {:?} is empty", reference)))
    }

    /// Key frames replace every slot
    pub fn set_all(&mut self, raster: &RasterHandle) {
        self.last = Some(raster.clone());
        self.golden = Some(raster.clone());
        self.alternate = Some(raster.clone());
    }

    /// Apply an inter frame's copy and refresh flags
    ///
    /// Copies read the slots as they were before this frame; refreshes with
    /// the new raster are applied after all copies. Returns the handles that
    /// were displaced.
    pub fn apply_inter_update(
        &mut self,
        header: &InterFrameHeader,
        raster: &RasterHandle,
    ) -> Vec<RasterHandle> {
        let old = self.clone();

        match header.copy_buffer_to_golden {
            Some(1) => self.golden = old.last.clone(),
            Some(2) => self.golden = old.alternate.clone(),
            _ => {}
        }
        match header.copy_buffer_to_alternate {
            Some(1) => self.alternate = old.last.clone(),
            Some(2) => self.alternate = old.golden.clone(),
            _ => {}
        }

        if header.refresh_golden {
            self.golden = Some(raster.clone());
        }
        if header.refresh_alternate {
            self.alternate = Some(raster.clone());
        }
        if header.refresh_last {
            self.last = Some(raster.clone());
        }

        [old.last, old.golden, old.alternate]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(value: u8) -> RasterHandle {
        let mut raster = Raster::new(16, 16);
        raster.y.data_mut().fill(value);
        RasterHandle::new(raster)
    }

    #[test]
    fn test_raster_padding() {
        let raster = Raster::new(17, 9);
        assert_eq!(raster.macroblock_width(), 2);
        assert_eq!(raster.macroblock_height(), 1);
        assert_eq!(raster.y.width(), 32);
        assert_eq!(raster.u.height(), 8);
        assert_eq!(raster.to_i420().len(), 17 * 9 + 2 * 9 * 5);
    }

    #[test]
    fn test_clamped_reads() {
        let mut plane = Plane::new(4, 4);
        for (i, px) in plane.data_mut().iter_mut().enumerate() {
            *px = i as u8;
        }
        assert_eq!(plane.clamped(-5, -5), 0);
        assert_eq!(plane.clamped(10, 1), 7);
        assert_eq!(plane.clamped(2, 9), 14);
    }

    #[test]
    fn test_copy_on_write() {
        let mut a = filled(10);
        let b = a.clone();
        assert!(a.is_shared());

        a.make_mut().y.data_mut()[0] = 99;
        assert_eq!(b.y.at(0, 0), 10);
        assert_eq!(a.y.at(0, 0), 99);
        assert!(!a.ptr_eq(&b));
        assert!(!a.is_shared());
    }

    #[test]
    fn test_pool_skips_shared() {
        let mut pool = RasterPool::new(16, 16);
        let first = pool.acquire();
        let held = first.clone();
        pool.recycle(first);
        assert!(pool.is_empty());

        pool.recycle(held);
        assert_eq!(pool.len(), 1);
        let again = pool.acquire();
        assert!(!again.is_shared());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_inter_update_copies_read_old_slots() {
        let last = filled(1);
        let golden = filled(2);
        let alternate = filled(3);
        let mut refs = ReferenceSet {
            last: Some(last.clone()),
            golden: Some(golden.clone()),
            alternate: Some(alternate.clone()),
        };

        let header = InterFrameHeader {
            copy_buffer_to_golden: Some(2),
            copy_buffer_to_alternate: Some(2),
            refresh_last: true,
            ..Default::default()
        };
        let new = filled(4);
        refs.apply_inter_update(&header, &new);

        assert!(refs.golden.as_ref().unwrap().ptr_eq(&alternate));
        assert!(refs.alternate.as_ref().unwrap().ptr_eq(&golden));
        assert!(refs.last.as_ref().unwrap().ptr_eq(&new));
    }

    #[test]
    fn test_require_empty_slot() {
        let refs = ReferenceSet::default();
        assert!(matches!(
            refs.require(ReferenceFrame::Golden),
            Err(Error::LogicError(_))
        ));
    }
}
