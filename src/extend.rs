//! Turning a seed chain into one or more scored alignment regions by banded
//! extension around representative seeds.

use crate::chain::Chain;
use crate::index::RefIndex;
use crate::opts::MapOpts;
use crate::region::AlnReg;
use crate::sw;

/// Affine-gap bound on how far an alignment of `qlen` flank bases can wander
/// into the reference.
fn cal_max_gap(opts: &MapOpts, qlen: i32) -> i64 {
    let l = ((qlen as f64 * opts.a as f64 - opts.q as f64) / opts.r as f64 + 1.0) as i64;
    l.max(1)
}

/// Extend chain `c` into alignment regions appended to `out` (which is
/// cleared first). A chain whose reference window cannot be fetched in full
/// (strand straddle or clamping) is skipped.
pub fn extend_chain(opts: &MapOpts,
                    index: &RefIndex,
                    query: &[u8],
                    c: &Chain,
                    out: &mut Vec<AlnReg>) {
    out.clear();
    let l_query = query.len() as i32;

    // maximal window any extension of this chain could touch
    let mut rmax0 = index.l_pac() << 1;
    let mut rmax1 = 0i64;
    for t in &c.seeds {
        let b = t.rbeg - (t.qbeg as i64 + cal_max_gap(opts, t.qbeg));
        let e = t.rbeg
            + t.len as i64
            + (l_query - t.qbeg - t.len) as i64
            + cal_max_gap(opts, l_query - t.qbeg - t.len);
        rmax0 = rmax0.min(b);
        rmax1 = rmax1.max(e);
    }
    let rseq = index.get_seq(rmax0, rmax1);
    if rseq.len() as i64 != rmax1 - rmax0 {
        debug!("skipping chain at {}: window [{}, {}) not fetchable",
               c.anchor_pos(),
               rmax0,
               rmax1);
        return;
    }

    let mut k = 0;
    while k < c.seeds.len() {
        let s = c.seeds[k];
        let mut a = AlnReg::new();

        if s.qbeg > 0 {
            // left extension runs on reversed flanks
            let qs: Vec<u8> = query[..s.qbeg as usize].iter().rev().cloned().collect();
            let roff = (s.rbeg - rmax0) as usize;
            let rs: Vec<u8> = rseq[..roff].iter().rev().cloned().collect();
            let (qle, tle, score) =
                sw::extend(&qs, &rs, &opts.mat, opts.q, opts.r, opts.w, s.len * opts.a);
            a.score = score;
            a.qb = s.qbeg - qle;
            a.rb = s.rbeg - tle as i64;
        } else {
            a.score = s.len * opts.a;
            a.qb = 0;
            a.rb = s.rbeg;
        }

        if s.qbeg + s.len != l_query {
            let qe = (s.qbeg + s.len) as usize;
            let re = (s.rbeg + s.len as i64 - rmax0) as usize;
            let (qle, tle, score) = sw::extend(&query[qe..],
                                               &rseq[re..],
                                               &opts.mat,
                                               opts.q,
                                               opts.r,
                                               opts.w,
                                               a.score);
            a.score = score;
            a.qe = qe as i32 + qle;
            a.re = rmax0 + re as i64 + tle as i64;
        } else {
            a.qe = l_query;
            a.re = s.rbeg + s.len as i64;
        }
        debug!("seed {}: score={} [{},{}) <=> [{},{})", k, a.score, a.qb, a.qe, a.rb, a.re);

        a.seedcov = c.seeds
            .iter()
            .filter(|t| {
                t.qbeg >= a.qb
                    && t.qbeg + t.len <= a.qe
                    && t.rbeg >= a.rb
                    && t.rbeg + t.len as i64 <= a.re
            })
            .map(|t| t.len)
            .sum();
        out.push(a);

        // the next anchor is the first seed barely overlapping its
        // predecessor, or poking out of the region just built
        let mut i = k + 1;
        while i < c.seeds.len() {
            let t = c.seeds[i];
            let p = c.seeds[i - 1];
            let barely_overlaps =
                p.qbeg + p.len < t.qbeg + 7 && p.rbeg + (p.len as i64) < t.rbeg + 7;
            let pokes_out = t.rbeg + t.len as i64 > out.last().unwrap().re
                || t.qbeg + t.len > out.last().unwrap().qe;
            if barely_overlaps || pokes_out {
                break;
            }
            i += 1;
        }
        k = i;
    }
}
