//! PatchGeometry (spec §4.1): flat linear offset tables for a cubic
//! neighborhood of a given radius, plus a parallel Manhattan-distance
//! table for search neighborhoods.

/// An ordered sequence of signed linear offsets addressing every neighbor
/// inside a cubic radius around some center linear index (spec §3,
/// `OffsetTable`). `manhattan[i]` is `Some` only when the table was built
/// with `with_manhattan = true` (search tables); patch tables leave it
/// `None` since nothing downstream needs it.
#[derive(Clone, Debug)]
pub struct OffsetTable {
    pub offsets: Vec<isize>,
    /// Relative `(dx, dy, dz)` voxel-space coordinate for each offset, in
    /// the same order. Kept alongside the flattened `offsets` so callers
    /// that need to re-derive a target-grid coordinate from a patch
    /// position (e.g. [`crate::posterior::accumulate_votes`]) don't have
    /// to invert the stride arithmetic.
    pub deltas: Vec<(i32, i32, i32)>,
    pub manhattan: Option<Vec<u32>>,
}

impl OffsetTable {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Build an offset table over a cube of radius `radius = (rx, ry, rz)`,
/// for an image whose voxel-unit linear strides are `strides = (sx, sy, sz)`.
///
/// Iteration order is lexicographic over relative offsets `(dz, dy, dx)`,
/// each ranging `-r .. +r` inclusive: z outermost, x innermost. This is
/// deterministic but otherwise arbitrary — nothing downstream depends on
/// which entry is index 0.
pub fn build_offset_table(
    radius: (usize, usize, usize),
    strides: (isize, isize, isize),
    with_manhattan: bool,
) -> OffsetTable {
    let (rx, ry, rz) = (radius.0 as isize, radius.1 as isize, radius.2 as isize);
    let (sx, sy, sz) = strides;
    let n = (2 * radius.0 + 1) * (2 * radius.1 + 1) * (2 * radius.2 + 1);

    let mut offsets = Vec::with_capacity(n);
    let mut deltas = Vec::with_capacity(n);
    let mut manhattan = with_manhattan.then(|| Vec::with_capacity(n));

    for dz in -rz..=rz {
        for dy in -ry..=ry {
            for dx in -rx..=rx {
                offsets.push(dz * sz + dy * sy + dx * sx);
                deltas.push((dx as i32, dy as i32, dz as i32));
                if let Some(m) = manhattan.as_mut() {
                    m.push((dz.unsigned_abs() + dy.unsigned_abs() + dx.unsigned_abs()) as u32);
                }
            }
        }
    }

    debug_assert_eq!(offsets.len(), n);
    OffsetTable {
        offsets,
        deltas,
        manhattan,
    }
}
