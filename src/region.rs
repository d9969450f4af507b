//! Alignment regions and their post-processing: ordering, de-duplication,
//! primary/secondary marking and approximate mapping quality.

use crate::opts::{MapOpts, MAPQ_COEF};

/// A local alignment of query interval `[qb, qe)` against reference
/// interval `[rb, re)` in the doubled coordinate space.
#[derive(Clone, Copy, Debug)]
pub struct AlnReg {
    pub qb: i32,
    pub qe: i32,
    pub rb: i64,
    pub re: i64,
    /// Extended local alignment score.
    pub score: i32,
    /// Summed length of the chain seeds fully inside the region.
    pub seedcov: i32,
    /// Score of the best distinct region overlapping this one on the query.
    pub sub: i32,
    /// Sub-score carried in from chain filtering (unused on the single-end
    /// path, kept for the mapq formula).
    pub csub: i32,
    /// Number of suboptimal regions scoring within one mismatch/gap of this
    /// one.
    pub sub_n: i32,
    /// `-1` for a primary region, otherwise the index of its primary.
    pub secondary: i32,
}

impl AlnReg {
    pub fn new() -> AlnReg {
        AlnReg {
            qb: 0,
            qe: 0,
            rb: 0,
            re: 0,
            score: 0,
            seedcov: 0,
            sub: 0,
            csub: 0,
            sub_n: 0,
            secondary: -1,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.secondary < 0
    }
}

impl Default for AlnReg {
    fn default() -> AlnReg {
        AlnReg::new()
    }
}

/// Order regions by descending score (ties: reference start, then query
/// start) and drop exact duplicates of that key. Idempotent.
pub fn sort_and_dedup(regs: &mut Vec<AlnReg>) {
    if regs.len() <= 1 {
        return;
    }
    regs.sort_by(|x, y| {
        y.score
            .cmp(&x.score)
            .then(x.rb.cmp(&y.rb))
            .then(x.qb.cmp(&y.qb))
    });
    regs.dedup_by(|b, a| a.score == b.score && a.rb == b.rb && a.qb == b.qb);
}

/// Partition sorted regions into primaries and their secondaries. Must run
/// after `sort_and_dedup`. A region overlapping an earlier primary on more
/// than `mask_level` of the shorter of the two becomes that primary's
/// secondary; the first such demotion fixes the primary's sub-score, and
/// near-ties bump its suboptimal count.
pub fn mark_primary(opts: &MapOpts, regs: &mut [AlnReg]) {
    if regs.is_empty() {
        return;
    }
    for r in regs.iter_mut() {
        r.sub = 0;
        r.sub_n = 0;
        r.secondary = -1;
    }
    let near = (opts.a + opts.b).max(opts.q + opts.r);
    let mut primaries: Vec<usize> = vec![0];
    for i in 1..regs.len() {
        let mut owner = None;
        for &j in &primaries {
            let b_max = regs[j].qb.max(regs[i].qb);
            let e_min = regs[j].qe.min(regs[i].qe);
            if e_min <= b_max {
                continue;
            }
            let min_l = (regs[i].qe - regs[i].qb).min(regs[j].qe - regs[j].qb);
            if (e_min - b_max) as f64 >= min_l as f64 * opts.mask_level as f64 {
                owner = Some(j);
                break;
            }
        }
        match owner {
            Some(j) => {
                if regs[j].sub == 0 {
                    regs[j].sub = regs[i].score;
                }
                if regs[j].score - regs[i].score <= near {
                    regs[j].sub_n += 1;
                }
                regs[i].secondary = j as i32;
            },
            None => primaries.push(i),
        }
    }
}

/// Phred-scaled confidence that a primary region is placed correctly.
/// Clamped to `[0, 60]`.
pub fn approx_mapq(opts: &MapOpts, a: &AlnReg) -> i32 {
    let mut sub = if a.sub != 0 { a.sub } else { opts.min_seed_len * opts.a };
    sub = sub.max(a.csub);
    if sub >= a.score {
        return 0;
    }
    let l = (a.qe - a.qb).max((a.re - a.rb) as i32);
    let mut mapq = if a.score != 0 {
        (MAPQ_COEF * (1.0 - sub as f64 / a.score as f64) * (a.seedcov as f64).ln()
         + 0.499) as i32
    } else {
        0
    };
    let identity = 1.0
        - (l as f64 * opts.a as f64 - a.score as f64)
          / (opts.a + opts.b) as f64
          / l as f64;
    if identity < 0.95 {
        mapq = (mapq as f64 * identity * identity + 0.499) as i32;
    }
    if a.sub_n > 0 {
        mapq -= (4.343 * (a.sub_n as f64).ln() + 0.499) as i32;
    }
    mapq.max(0).min(60)
}

#[cfg(test)]
mod test {
    use super::*;

    fn reg(qb: i32, qe: i32, rb: i64, re: i64, score: i32) -> AlnReg {
        AlnReg {
            qb,
            qe,
            rb,
            re,
            score,
            seedcov: qe - qb,
            ..AlnReg::new()
        }
    }

    #[test]
    fn sort_orders_by_score_then_position() {
        let mut regs = vec![reg(0, 10, 50, 60, 5),
                            reg(0, 20, 10, 30, 9),
                            reg(0, 20, 5, 25, 9)];
        sort_and_dedup(&mut regs);
        assert_eq!(vec![(9, 5), (9, 10), (5, 50)],
                   regs.iter().map(|r| (r.score, r.rb)).collect::<Vec<_>>());
    }

    #[test]
    fn dedup_removes_identical_hits() {
        let mut regs = vec![reg(0, 20, 10, 30, 9),
                            reg(0, 18, 10, 28, 9),
                            reg(0, 10, 50, 60, 5)];
        sort_and_dedup(&mut regs);
        assert_eq!(2, regs.len());
        // the first of the duplicate pair is the one kept
        assert_eq!(20, regs[0].qe);
    }

    #[test]
    fn dedup_is_idempotent() {
        let mut once = vec![reg(0, 20, 10, 30, 9),
                            reg(0, 18, 10, 28, 9),
                            reg(2, 12, 80, 90, 7),
                            reg(0, 10, 50, 60, 5)];
        sort_and_dedup(&mut once);
        let mut twice = once.clone();
        sort_and_dedup(&mut twice);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!((a.score, a.rb, a.qb), (b.score, b.rb, b.qb));
        }
    }

    #[test]
    fn overlapping_region_becomes_secondary() {
        let opts = MapOpts::default();
        let mut regs = vec![reg(0, 30, 100, 130, 30), reg(0, 28, 400, 428, 22)];
        mark_primary(&opts, &mut regs);
        assert!(regs[0].is_primary());
        assert_eq!(0, regs[1].secondary);
        assert_eq!(22, regs[0].sub);
        // 30 - 22 > max(a+b, q+r): not counted as a near-tie
        assert_eq!(0, regs[0].sub_n);
    }

    #[test]
    fn near_tie_bumps_sub_n() {
        let opts = MapOpts::default();
        let mut regs = vec![reg(0, 30, 100, 130, 30), reg(0, 30, 400, 430, 28)];
        mark_primary(&opts, &mut regs);
        assert_eq!(28, regs[0].sub);
        assert_eq!(1, regs[0].sub_n);
    }

    #[test]
    fn disjoint_regions_are_both_primary() {
        let opts = MapOpts::default();
        let mut regs = vec![reg(0, 25, 100, 125, 25), reg(25, 50, 400, 425, 25)];
        mark_primary(&opts, &mut regs);
        assert!(regs.iter().all(AlnReg::is_primary));
    }

    #[test]
    fn secondary_points_at_overlapping_primary() {
        let opts = MapOpts::default();
        let mut regs = vec![reg(0, 30, 100, 130, 30),
                            reg(30, 60, 200, 230, 27),
                            reg(32, 58, 500, 526, 20)];
        mark_primary(&opts, &mut regs);
        assert!(regs[0].is_primary());
        assert!(regs[1].is_primary());
        assert_eq!(1, regs[2].secondary);
        let j = regs[2].secondary as usize;
        let b_max = regs[j].qb.max(regs[2].qb);
        let e_min = regs[j].qe.min(regs[2].qe);
        assert!(e_min > b_max);
    }

    #[test]
    fn mapq_zero_when_sub_matches_score() {
        let opts = MapOpts::default();
        let mut a = reg(0, 30, 100, 130, 30);
        a.sub = 30;
        assert_eq!(0, approx_mapq(&opts, &a));
    }

    #[test]
    fn mapq_high_for_clean_unique_hit() {
        let mut opts = MapOpts::default();
        opts.min_seed_len = 5;
        let a = reg(0, 30, 100, 130, 30);
        let q = approx_mapq(&opts, &a);
        assert!(q >= 30, "mapq {}", q);
    }

    #[test]
    fn mapq_penalized_by_identity_and_sub_n() {
        let opts = MapOpts::default();
        // low-identity region with a close runner-up
        let mut a = reg(0, 60, 100, 160, 20);
        a.sub = 18;
        a.sub_n = 3;
        let q = approx_mapq(&opts, &a);
        assert!(q < 20);
        assert!(q >= 0);
    }

    quickcheck! {
        fn mapq_stays_in_range(qspan: u8, score: i8, sub: i8, sub_n: u8, seedcov: u8) -> bool {
            let opts = MapOpts::default();
            let a = AlnReg {
                qb: 0,
                qe: qspan as i32 + 1,
                rb: 0,
                re: qspan as i64 + 1,
                score: score as i32,
                seedcov: seedcov as i32,
                sub: sub as i32,
                csub: 0,
                sub_n: sub_n as i32,
                secondary: -1,
            };
            let q = approx_mapq(&opts, &a);
            q >= 0 && q <= 60
        }

        fn dedup_idempotent_on_arbitrary_input(raw: Vec<(u8, u8, i8)>) -> bool {
            let mut regs: Vec<AlnReg> = raw.iter()
                .map(|&(qb, len, score)| AlnReg {
                    qb: qb as i32,
                    qe: qb as i32 + len as i32 + 1,
                    rb: qb as i64,
                    re: qb as i64 + len as i64 + 1,
                    score: score as i32,
                    ..AlnReg::new()
                })
                .collect();
            sort_and_dedup(&mut regs);
            let mut again = regs.clone();
            sort_and_dedup(&mut again);
            regs.len() == again.len()
                && regs.iter().zip(again.iter()).all(|(a, b)| {
                    (a.score, a.rb, a.qb) == (b.score, b.rb, b.qb)
                })
        }
    }
}
