//! Banded Smith-Waterman kernels: extension alignment from a seed and global
//! alignment with CIGAR traceback. Sequences are 2-bit codes with 4 for
//! ambiguous bases; scores come from the 5x5 matrix in `MapOpts`.

/// Sentinel for cells outside the band. Far enough from zero that gap
/// arithmetic cannot overflow.
const NEG_INF: i32 = i32::MIN / 2;

/// Extend an alignment that already scores `h0` at the origin.
///
/// `query` and `target` are the flanks to be aligned, both starting at the
/// anchor (callers pass reversed slices for left extensions). Gaps cost
/// `o_gap + len * e_gap`; the DP is confined to the diagonal band
/// `|i - j| <= w`. Returns `(qle, tle, score)`: the number of query and
/// target bases consumed by the best extension and its total score.
/// `(0, 0, h0)` means no extension improves on the seed.
pub fn extend(query: &[u8],
              target: &[u8],
              mat: &[i8; 25],
              o_gap: i32,
              e_gap: i32,
              w: i32,
              h0: i32)
              -> (i32, i32, i32) {
    let qlen = query.len();
    let tlen = target.len();
    if qlen == 0 || tlen == 0 {
        return (0, 0, h0);
    }
    let oe = o_gap + e_gap;
    let w = w.max(0) as i64;

    // h[j] holds row i-1 while row i is being filled; f[j] is the running
    // gap-in-target score per column.
    let mut h: Vec<i32> = vec![NEG_INF; tlen + 1];
    let mut f: Vec<i32> = vec![NEG_INF; tlen + 1];
    h[0] = h0;
    for j in 1..=tlen {
        h[j] = if (j as i64) <= w { h0 - oe - (j as i32 - 1) * e_gap } else { NEG_INF };
    }

    let mut best = h0;
    let mut qle = 0i32;
    let mut tle = 0i32;

    for i in 1..=qlen {
        let qc = query[i - 1] as usize;
        let mut diag = h[0];
        h[0] = if (i as i64) <= w { h0 - oe - (i as i32 - 1) * e_gap } else { NEG_INF };
        let mut e = NEG_INF;
        for j in 1..=tlen {
            let up = h[j];
            e = (h[j - 1] - oe).max(e - e_gap);
            f[j] = (up - oe).max(f[j] - e_gap);
            let mut score = (diag + mat[qc * 5 + target[j - 1] as usize] as i32)
                .max(e)
                .max(f[j]);
            if (i as i64 - j as i64).abs() > w {
                score = NEG_INF;
            }
            h[j] = score;
            diag = up;
            if score > best {
                best = score;
                qle = i as i32;
                tle = j as i32;
            }
        }
    }
    (qle, tle, best)
}

/// One CIGAR operation: (`b'M'` | `b'I'` | `b'D'`, run length). Insertions
/// consume query, deletions consume target.
pub type Cigar = Vec<(u8, i32)>;

// traceback pointer bits
const FROM_M: u8 = 0;
const FROM_E: u8 = 1;
const FROM_F: u8 = 2;
const E_EXT: u8 = 0x4;
const F_EXT: u8 = 0x8;

/// Banded global alignment of `query` against `target` with affine gaps.
///
/// Returns the alignment score and a run-length CIGAR. An empty CIGAR is
/// only produced for empty inputs.
pub fn global(query: &[u8],
              target: &[u8],
              mat: &[i8; 25],
              o_gap: i32,
              e_gap: i32,
              w: i32)
              -> (i32, Cigar) {
    let qlen = query.len();
    let tlen = target.len();
    if qlen == 0 || tlen == 0 {
        return (0, Vec::new());
    }
    let oe = o_gap + e_gap;
    // the band must at least cover the length difference or no global path
    // exists
    let w = (w.max(1) as i64).max((qlen as i64 - tlen as i64).abs());

    let cols = tlen + 1;
    let mut h = vec![NEG_INF; (qlen + 1) * cols];
    let mut e = vec![NEG_INF; (qlen + 1) * cols];
    let mut fv = vec![NEG_INF; (qlen + 1) * cols];
    let mut ptr = vec![0u8; (qlen + 1) * cols];

    h[0] = 0;
    for j in 1..=tlen {
        if (j as i64) <= w {
            e[j] = -oe - (j as i32 - 1) * e_gap;
            h[j] = e[j];
            ptr[j] = FROM_E | if j > 1 { E_EXT } else { 0 };
        }
    }
    for i in 1..=qlen {
        if (i as i64) <= w {
            fv[i * cols] = -oe - (i as i32 - 1) * e_gap;
            h[i * cols] = fv[i * cols];
            ptr[i * cols] = FROM_F | if i > 1 { F_EXT } else { 0 };
        }
    }

    for i in 1..=qlen {
        let qc = query[i - 1] as usize;
        let lo = if i as i64 > w { (i as i64 - w) as usize } else { 1 };
        let hi = tlen.min((i as i64 + w) as usize);
        for j in lo..=hi {
            let idx = i * cols + j;
            let up = (i - 1) * cols + j;
            let left = idx - 1;
            let diag = up - 1;

            let e_open = h[left] - oe;
            let e_ext = e[left] - e_gap;
            e[idx] = e_open.max(e_ext);

            let f_open = h[up] - oe;
            let f_ext = fv[up] - e_gap;
            fv[idx] = f_open.max(f_ext);

            let m = h[diag] + mat[qc * 5 + target[j - 1] as usize] as i32;
            let mut p = 0u8;
            if e_ext > e_open {
                p |= E_EXT;
            }
            if f_ext > f_open {
                p |= F_EXT;
            }
            let best = m.max(e[idx]).max(fv[idx]);
            if best == m {
                p |= FROM_M;
            } else if best == e[idx] {
                p |= FROM_E;
            } else {
                p |= FROM_F;
            }
            h[idx] = best;
            ptr[idx] = p;
        }
    }

    let score = h[qlen * cols + tlen];
    let mut cigar: Cigar = Vec::new();
    let mut push = |cigar: &mut Cigar, op: u8| {
        match cigar.last_mut() {
            Some(last) if last.0 == op => last.1 += 1,
            _ => cigar.push((op, 1)),
        }
    };

    let (mut i, mut j) = (qlen, tlen);
    // state 0 = H, 1 = E, 2 = F
    let mut state = 0u8;
    while i > 0 || j > 0 {
        let p = ptr[i * cols + j];
        if state == 0 {
            state = p & 0x3;
        }
        match state {
            1 => {
                push(&mut cigar, b'D');
                state = if p & E_EXT != 0 { 1 } else { 0 };
                j -= 1;
            },
            2 => {
                push(&mut cigar, b'I');
                state = if p & F_EXT != 0 { 2 } else { 0 };
                i -= 1;
            },
            _ => {
                push(&mut cigar, b'M');
                i -= 1;
                j -= 1;
            },
        }
    }
    cigar.reverse();
    (score, cigar)
}
