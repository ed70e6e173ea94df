//! Row-major dense storage over a hyperrectangle.

use crate::cell::Cell;
use crate::codec::ByteReader;
use crate::error::GridError;
use rift_geom::{HyperRect, Point};

/// Dense per-cell storage over a hyperrectangle.
///
/// Cells are stored row-major (last dimension contiguous). All flat
/// indices and pack/unpack coordinates are relative to the storage's own
/// rectangle, so a grid shaped to a halo rectangle addresses halo cells
/// without translation by the caller.
#[derive(Clone, Debug)]
pub struct DenseGrid<T: Cell> {
    rect: HyperRect,
    init: T,
    data: Vec<T>,
}

impl<T: Cell> DenseGrid<T> {
    /// Allocate storage for `rect` with every cell set to `init`.
    pub fn new(rect: HyperRect, init: T) -> Self {
        let len = rect.area() as usize;
        Self {
            rect,
            data: vec![init.clone(); len],
            init,
        }
    }

    /// The rectangle this storage covers.
    pub fn rect(&self) -> &HyperRect {
        &self.rect
    }

    /// The value fresh and cleared cells take.
    pub fn init(&self) -> &T {
        &self.init
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when the storage covers no cells.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read a cell by flat index.
    pub fn get(&self, idx: usize) -> &T {
        &self.data[idx]
    }

    /// Write a cell by flat index.
    pub fn set(&mut self, idx: usize, v: T) {
        self.data[idx] = v;
    }

    /// Flat index of a world point, or `None` when outside the storage.
    pub fn flat_index(&self, p: &Point) -> Option<usize> {
        self.rect.flat_index(p)
    }

    /// Read a cell by world point.
    pub fn cell(&self, p: &Point) -> Option<&T> {
        self.flat_index(p).map(|i| &self.data[i])
    }

    /// Write a cell by world point. Returns `false` when `p` is outside.
    pub fn put(&mut self, p: &Point, v: T) -> bool {
        match self.flat_index(p) {
            Some(i) => {
                self.data[i] = v;
                true
            }
            None => false,
        }
    }

    /// Reallocate for a new rectangle. Preserves no data.
    pub fn reshape(&mut self, rect: HyperRect) {
        let len = rect.area() as usize;
        self.rect = rect;
        self.data = vec![self.init.clone(); len];
    }

    /// A new storage over `rect` with the same init value.
    pub fn fresh(&self, rect: HyperRect) -> Self {
        Self::new(rect, self.init.clone())
    }

    /// Serialize the cells of `rects` (in list order, row-major within
    /// each) into one buffer.
    pub fn pack(&self, rects: &[HyperRect]) -> Result<Vec<u8>, GridError> {
        let mut cells = 0i64;
        for r in rects {
            if !r.is_empty() && !self.rect.contains_rect(r) {
                return Err(GridError::RectOutOfStorage {
                    rect: r.clone(),
                    storage: self.rect.clone(),
                });
            }
            cells += r.area();
        }
        let mut buf = Vec::new();
        if let Some(width) = T::fixed_width() {
            buf.reserve(cells as usize * width);
        }
        for r in rects {
            self.for_each_span(r, |start, span| {
                for cell in &self.data[start..start + span] {
                    cell.encode(&mut buf);
                }
            });
        }
        Ok(buf)
    }

    /// Deserialize `buf` into the cells of `rects`, mirroring
    /// [`pack`](Self::pack). The buffer must hold exactly the covered
    /// cells.
    pub fn unpack(&mut self, rects: &[HyperRect], buf: &[u8]) -> Result<(), GridError> {
        for r in rects {
            if !r.is_empty() && !self.rect.contains_rect(r) {
                return Err(GridError::RectOutOfStorage {
                    rect: r.clone(),
                    storage: self.rect.clone(),
                });
            }
        }
        let mut reader = ByteReader::new(buf);
        for r in rects {
            let mut result = Ok(());
            self.for_each_span_mut(r, |data, start, span| {
                if result.is_err() {
                    return;
                }
                for cell in data[start..start + span].iter_mut() {
                    match T::decode(&mut reader) {
                        Ok(v) => *cell = v,
                        Err(e) => {
                            result = Err(e);
                            return;
                        }
                    }
                }
            });
            result?;
        }
        if !reader.is_empty() {
            return Err(GridError::LengthMismatch {
                trailing: reader.remaining(),
            });
        }
        Ok(())
    }

    /// Visit each contiguous row span of `sub` as `(start, len)` flat
    /// ranges into the storage.
    fn for_each_span(&self, sub: &HyperRect, mut f: impl FnMut(usize, usize)) {
        let nd = self.rect.ndim();
        if sub.is_empty() {
            return;
        }
        let storage_size = self.rect.size();
        let span = sub.size()[nd - 1] as usize;
        let mut prefix: Vec<i32> = sub.ul.as_slice().to_vec();
        loop {
            let mut start = 0usize;
            for d in 0..nd {
                start = start * storage_size[d] as usize
                    + (prefix[d] - self.rect.ul[d]) as usize;
            }
            f(start, span);

            // Advance the odometer over the leading dimensions.
            let mut d = nd - 1;
            loop {
                if d == 0 {
                    return;
                }
                d -= 1;
                prefix[d] += 1;
                if prefix[d] < sub.br[d] {
                    break;
                }
                prefix[d] = sub.ul[d];
            }
        }
    }

    fn for_each_span_mut(
        &mut self,
        sub: &HyperRect,
        mut f: impl FnMut(&mut [T], usize, usize),
    ) {
        let nd = self.rect.ndim();
        if sub.is_empty() {
            return;
        }
        let storage_size = self.rect.size();
        let storage_ul = self.rect.ul.clone();
        let span = sub.size()[nd - 1] as usize;
        let mut prefix: Vec<i32> = sub.ul.as_slice().to_vec();
        loop {
            let mut start = 0usize;
            for d in 0..nd {
                start = start * storage_size[d] as usize
                    + (prefix[d] - storage_ul[d]) as usize;
            }
            f(&mut self.data, start, span);

            let mut d = nd - 1;
            loop {
                if d == 0 {
                    return;
                }
                d -= 1;
                prefix[d] += 1;
                if prefix[d] < sub.br[d] {
                    break;
                }
                prefix[d] = sub.ul[d];
            }
        }
    }
}
