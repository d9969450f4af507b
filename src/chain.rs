//! Building co-linear seed chains from SMEM occurrences and pruning chains
//! dominated by better overlapping ones.

use std::collections::BTreeMap;

use crate::index::RefIndex;
use crate::opts::MapOpts;
use crate::smem::SmemIter;

/// One exact match placed on the reference: query offset, position in the
/// doubled space, length (> 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seed {
    pub qbeg: i32,
    pub rbeg: i64,
    pub len: i32,
}

/// A group of co-linear seeds treated as one alignment candidate. Seeds
/// ascend in `qbeg` and never decrease in `rbeg`.
#[derive(Clone, Debug)]
pub struct Chain {
    pub seeds: Vec<Seed>,
}

impl Chain {
    /// Key of the ordered chain container.
    pub fn anchor_pos(&self) -> i64 {
        self.seeds[0].rbeg
    }

    /// Query span covered by the chain: `qbeg` of the first seed to the end
    /// of the last.
    pub fn query_span(&self) -> (i32, i32) {
        let first = &self.seeds[0];
        let last = self.seeds.last().unwrap();
        (first.qbeg, last.qbeg + last.len)
    }

    /// Try to absorb seed `p`. Seeds contained in the chain's current span
    /// are dropped; otherwise `p` is appended when it stays within the band
    /// and gap limits. Returns false when a new chain has to be started.
    fn test_and_merge(&mut self, opts: &MapOpts, p: &Seed) -> bool {
        let first = self.seeds[0];
        let last = *self.seeds.last().unwrap();
        let qend = (last.qbeg + last.len) as i64;
        let rend = last.rbeg + last.len as i64;
        if p.qbeg >= first.qbeg && (p.qbeg + p.len) as i64 <= qend && p.rbeg >= first.rbeg
           && p.rbeg + p.len as i64 <= rend {
            // contained seed, nothing to do
            return true;
        }
        let x = (p.qbeg - last.qbeg) as i64; // non-negative: seeds arrive in query order
        let y = p.rbeg - last.rbeg;
        if y >= 0 && (x - y).abs() <= opts.w as i64 && x - (last.len as i64) < opts.max_chain_gap
           && y - (last.len as i64) < opts.max_chain_gap {
            self.seeds.push(*p);
            return true;
        }
        false
    }
}

/// Collect SMEMs of `query` and cluster their occurrences into chains,
/// returned in order of reference position. Queries shorter than the seed
/// length cannot produce a match.
pub fn chain_seeds(opts: &MapOpts, index: &RefIndex, query: &[u8]) -> Vec<Chain> {
    if (query.len() as i32) < opts.min_seed_len {
        return Vec::new();
    }

    // ordered by (anchor position, insertion ordinal); the ordinal keeps
    // chains with equal anchors apart
    let mut tree: BTreeMap<(i64, u32), Chain> = BTreeMap::new();
    let mut ordinal = 0u32;

    let mut iter = SmemIter::new(index);
    iter.set_query(query);
    while let Some(batch) = iter.next(opts.max_seed_len, opts.min_intv) {
        for m in &batch {
            if m.len() < opts.min_seed_len || m.occ > opts.max_occ {
                // too short or too repetitive
                continue;
            }
            for rbeg in index.sa_positions(&m.sai) {
                let seed = Seed {
                    qbeg: m.qbeg,
                    rbeg,
                    len: m.len(),
                };
                // nearest chain at or below this occurrence
                let merged = tree.range_mut(..=(rbeg, u32::MAX))
                    .next_back()
                    .map_or(false, |(_, c)| c.test_and_merge(opts, &seed));
                if !merged {
                    tree.insert((rbeg, ordinal), Chain { seeds: vec![seed] });
                    ordinal += 1;
                }
            }
        }
    }
    tree.into_values().collect()
}

/// Unique coverage of a set of intervals already sorted by start.
fn covered_len<I: Iterator<Item = (i64, i64)>>(intervals: I) -> i64 {
    let mut w = 0;
    let mut end = 0;
    for (b, e) in intervals {
        if b >= end {
            w += e - b;
        } else if e > end {
            w += e - end;
        }
        end = end.max(e);
    }
    w
}

/// Coverage weight of a chain: the minimum of its unique projections onto
/// the query and the reference axis.
pub fn chain_weight(c: &Chain) -> i64 {
    let wq = covered_len(c.seeds.iter().map(|s| (s.qbeg as i64, (s.qbeg + s.len) as i64)));
    let wr = covered_len(c.seeds.iter().map(|s| (s.rbeg, s.rbeg + s.len as i64)));
    wq.min(wr)
}

struct FltAux {
    beg: i32,
    end: i32,
    w: i64,
    idx: usize,
    p2: Option<usize>,
}

/// Drop chains that significantly overlap a clearly better chain on the
/// query. Survivors come back in descending weight order; the first
/// significant sub-partner of a kept chain survives with it.
pub fn filter_chains(opts: &MapOpts, chains: Vec<Chain>) -> Vec<Chain> {
    if chains.len() <= 1 {
        return chains;
    }

    let mut aux: Vec<FltAux> = chains.iter()
        .enumerate()
        .map(|(idx, c)| {
            let (beg, end) = c.query_span();
            FltAux {
                beg,
                end,
                w: chain_weight(c),
                idx,
                p2: None,
            }
        })
        .collect();
    // stable: equal weights stay in reference order
    aux.sort_by(|a, b| b.w.cmp(&a.w));

    let mut kept: Vec<usize> = vec![0];
    for i in 1..aux.len() {
        let mut dropped = false;
        for k in 0..kept.len() {
            let j = kept[k];
            let b_max = aux[j].beg.max(aux[i].beg);
            let e_min = aux[j].end.min(aux[i].end);
            if e_min <= b_max {
                continue;
            }
            let min_l = (aux[i].end - aux[i].beg).min(aux[j].end - aux[j].beg);
            if (e_min - b_max) as f64 >= min_l as f64 * opts.mask_level as f64 {
                if aux[j].p2.is_none() {
                    aux[j].p2 = Some(i);
                }
                if (aux[i].w as f64) < aux[j].w as f64 * opts.chain_drop_ratio as f64
                   && aux[j].w - aux[i].w >= (opts.min_seed_len as i64) << 1 {
                    dropped = true;
                    break;
                }
            }
        }
        if !dropped {
            kept.push(i);
        }
    }

    let mut keep = vec![false; aux.len()];
    for &k in &kept {
        keep[k] = true;
        if let Some(p2) = aux[k].p2 {
            keep[p2] = true;
        }
    }

    let mut chains: Vec<Option<Chain>> = chains.into_iter().map(Some).collect();
    let survivors: Vec<Chain> = aux.iter()
        .enumerate()
        .filter(|&(pos, _)| keep[pos])
        .map(|(_, a)| chains[a.idx].take().unwrap())
        .collect();
    debug!("chain filter kept {} of {}", survivors.len(), chains.len());
    survivors
}
