//! The reference index: a 2-bit packed sequence plus an FMD-index over the
//! forward strand and its reverse complement, queried for super-maximal
//! exact matches.

use bio::alphabets;
use bio::data_structures::bwt::{bwt, less, Less, Occ, BWT};
use bio::data_structures::fmindex::{BiInterval, FMDIndex, FMIndex, Interval};
use bio::data_structures::suffix_array::{suffix_array, SampledSuffixArray, SuffixArray};

use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::util::decode_base;

/// The FMD-index view borrowed from a `RefIndex`.
pub type Fmd<'a> = FMDIndex<&'a BWT, &'a Less, &'a Occ>;

const NT: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// One reference sequence inside the concatenated index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contig {
    /// FASTA record id.
    pub name: String,
    /// Start of this contig on the forward strand.
    pub offset: i64,
    /// Contig length.
    pub len: i64,
}

/// A super-maximal exact match of a query against the index: the query
/// interval `[qbeg, qend)` and the suffix-array range of its `occ`
/// occurrences.
#[derive(Clone, Debug)]
pub struct Smem {
    pub qbeg: i32,
    pub qend: i32,
    pub sai: Interval,
    pub occ: usize,
}

impl Smem {
    pub fn len(&self) -> i32 {
        self.qend - self.qbeg
    }
}

/// Reference coordinates live in a doubled linear space of length
/// `2 * l_pac`: `[0, l_pac)` is the forward strand, `[l_pac, 2 * l_pac)` the
/// reverse complement. No valid region straddles `l_pac`.
#[derive(Serialize, Deserialize)]
pub struct RefIndex {
    /// Forward strand, 2-bit packed, four bases per byte.
    pac: Vec<u8>,
    l_pac: i64,
    contigs: Vec<Contig>,
    /// Sampled suffix array (with BWT, less and occ tables) over
    /// `forward$revcomp$`.
    pub suffix_array: SampledSuffixArray<BWT, Less, Occ>,
}

fn pac_get(pac: &[u8], i: i64) -> u8 {
    (pac[(i >> 2) as usize] >> ((i & 3) << 1)) & 3
}

impl RefIndex {
    /// Build an index from named ASCII sequences. Ambiguous bases are
    /// mapped to `A` so that the index stays deterministic; reads never
    /// seed across them anyway once their own `N`s are skipped.
    pub fn new(records: Vec<(String, Vec<u8>)>,
               occ_interval: u32,
               sa_sample: usize)
               -> RmemResult<RefIndex> {
        let mut contigs = Vec::with_capacity(records.len());
        let mut forward = Vec::new();
        for (name, seq) in records {
            if name.is_empty() {
                return Err(RmemError::InvalidHeader(name));
            }
            contigs.push(Contig {
                name,
                offset: forward.len() as i64,
                len: seq.len() as i64,
            });
            forward.extend(seq.iter().map(|&b| match b {
                b'A' | b'a' => b'A',
                b'C' | b'c' => b'C',
                b'G' | b'g' => b'G',
                b'T' | b't' => b'T',
                _ => b'A',
            }));
        }
        if forward.is_empty() {
            return Err(RmemError::EmptyReference);
        }
        let l_pac = forward.len() as i64;

        // FMD layout: forward strand, sentinel, reverse complement, sentinel
        let mut text = Vec::with_capacity(2 * forward.len() + 2);
        text.extend_from_slice(&forward);
        text.push(b'$');
        text.extend(alphabets::dna::revcomp(&forward));
        text.push(b'$');

        let mut pac = vec![0u8; (forward.len() + 3) / 4];
        for (i, &b) in forward.iter().enumerate() {
            let code = match b {
                b'C' => 1,
                b'G' => 2,
                b'T' => 3,
                _ => 0,
            };
            pac[i >> 2] |= code << ((i & 3) << 1);
        }

        info!("Building suffix array over {} bases...", text.len());
        let sa = suffix_array(&text);
        let alphabet = alphabets::dna::n_alphabet();
        let bwt = bwt(&text, &sa);
        let less = less(&bwt, &alphabet);
        let occ = Occ::new(&bwt, occ_interval, &alphabet);
        let sampled = sa.sample(&text, bwt, less, occ, sa_sample);
        info!("Suffix array sampled at {}.", sa_sample);

        Ok(RefIndex {
            pac,
            l_pac,
            contigs,
            suffix_array: sampled,
        })
    }

    pub fn l_pac(&self) -> i64 {
        self.l_pac
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    /// Borrow the FMD-index view. Cheap; built from the stored tables.
    pub fn fmd(&self) -> Fmd<'_> {
        FMDIndex::from(FMIndex::new(self.suffix_array.bwt(),
                                    self.suffix_array.less(),
                                    self.suffix_array.occ()))
    }

    /// Resolve a suffix-array interval into positions in the doubled
    /// coordinate space.
    pub fn sa_positions(&self, sai: &Interval) -> Vec<i64> {
        sai.occ(&self.suffix_array)
            .into_iter()
            .map(|p| {
                // skip the sentinel between the strands
                if (p as i64) < self.l_pac {
                    p as i64
                } else {
                    p as i64 - 1
                }
            })
            .collect()
    }

    /// Fetch decoded bases over `[beg, end)` of the doubled space. The range
    /// is clamped to `[0, 2 * l_pac]`; a range straddling the strand
    /// boundary yields an empty slice. Callers detect truncation by
    /// comparing lengths.
    pub fn get_seq(&self, beg: i64, end: i64) -> Vec<u8> {
        let (beg, end) = if end < beg { (end, beg) } else { (beg, end) };
        let beg = beg.max(0);
        let end = end.min(self.l_pac << 1);
        if beg >= end || (beg < self.l_pac && end > self.l_pac) {
            return Vec::new();
        }
        (beg..end).map(|p| self.base_at(p)).collect()
    }

    fn base_at(&self, p: i64) -> u8 {
        if p < self.l_pac {
            pac_get(&self.pac, p)
        } else {
            3 - pac_get(&self.pac, (self.l_pac << 1) - 1 - p)
        }
    }

    /// Map a doubled-space position to `(contig id, forward offset,
    /// is_reverse)`. For reverse-strand regions pass `re - 1` to land on
    /// the forward-strand start of the hit.
    pub fn pos_to_contig(&self, pos: i64) -> (usize, i64, bool) {
        let is_rev = pos >= self.l_pac;
        let fpos = if is_rev { (self.l_pac << 1) - 1 - pos } else { pos };
        let cid = match self.contigs
            .binary_search_by(|c| c.offset.cmp(&fpos)) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (cid, fpos - self.contigs[cid].offset, is_rev)
    }

    /// The SMEM primitive: all super-maximal exact matches of `query`
    /// (codes 0-4) covering position `start`, capped at `max_len` bases.
    /// When `min_occ > 1`, internal maximal matches still occurring
    /// `min_occ` times are reported as well. Returns the batch together
    /// with the cursor just past the longest match.
    ///
    /// `query[start]` must not be ambiguous.
    pub fn smem1(&self,
                 fmd: &Fmd<'_>,
                 query: &[u8],
                 start: usize,
                 max_len: i32,
                 min_occ: usize)
                 -> (usize, Vec<Smem>) {
        let mut out = Vec::new();
        let next = self.smem_walk(fmd, query, start, max_len, 1, &mut out);
        if min_occ > 1 {
            let mut sub = Vec::new();
            self.smem_walk(fmd, query, start, max_len, min_occ, &mut sub);
            for m in sub {
                if !out.iter().any(|s| s.qbeg == m.qbeg && s.qend == m.qend) {
                    out.push(m);
                }
            }
            out.sort_by_key(|s| (s.qbeg, s.qend));
        }
        (next, out)
    }

    /// Bidirectional maximal-match walk from `start`, stopping extensions
    /// whose suffix-array interval shrinks below `gate`. With `gate == 1`
    /// this yields exactly the SMEMs covering `start`.
    fn smem_walk(&self,
                 fmd: &Fmd<'_>,
                 query: &[u8],
                 start: usize,
                 max_len: i32,
                 gate: usize,
                 out: &mut Vec<Smem>)
                 -> usize {
        let len = query.len();
        debug_assert!(start < len && query[start] < 4);
        let ival_size = |iv: &BiInterval| {
            let f = iv.forward();
            f.upper - f.lower
        };

        // forward pass: record an interval each time an extension shrinks it
        let mut curr: Vec<(BiInterval, usize)> = Vec::new();
        let mut ik = fmd.init_interval_with(NT[query[start] as usize]);
        if ival_size(&ik) == 0 {
            // base absent from the reference
            return start + 1;
        }
        let mut end = start + 1;
        let mut i = start + 1;
        loop {
            if i == len || query[i] > 3 || (end - start) as i32 >= max_len {
                curr.push((ik, end));
                break;
            }
            let ok = fmd.forward_ext(&ik, NT[query[i] as usize]);
            let osz = ival_size(&ok);
            if osz != ival_size(&ik) {
                curr.push((ik.clone(), end));
                if osz < gate {
                    break;
                }
            }
            ik = ok;
            end = i + 1;
            i += 1;
        }
        // longest match first; its end is where the caller resumes
        curr.reverse();
        let next = curr[0].1;

        // backward pass: widen every candidate leftwards, reporting each one
        // the moment it cannot be extended (or only below the gate)
        let mut prev = curr;
        let mut matches: Vec<Smem> = Vec::new();
        let mut i = start as i64 - 1;
        loop {
            let c = if i >= 0 && query[i as usize] < 4 {
                Some(NT[query[i as usize] as usize])
            } else {
                None
            };
            let mut curr: Vec<(BiInterval, usize)> = Vec::new();
            for &(ref p, pend) in prev.iter() {
                let ext = c.map(|base| fmd.backward_ext(p, base));
                let stopped = match ext {
                    None => true,
                    Some(ref e) => ival_size(e) < gate,
                };
                if stopped {
                    // only report if no longer match survived this round and
                    // no match with the same start was already taken
                    if curr.is_empty() {
                        let qbeg = (i + 1) as i32;
                        if matches.last().map_or(true, |m| qbeg < m.qbeg) {
                            let f = p.forward();
                            if f.upper > f.lower {
                                matches.push(Smem {
                                    qbeg,
                                    qend: pend as i32,
                                    occ: f.upper - f.lower,
                                    sai: f,
                                });
                            }
                        }
                    }
                } else {
                    let e = ext.unwrap();
                    if curr.last().map_or(true, |l| ival_size(&l.0) != ival_size(&e)) {
                        curr.push((e, pend));
                    }
                }
            }
            if curr.is_empty() {
                break;
            }
            prev = curr;
            i -= 1;
        }
        matches.reverse();
        out.append(&mut matches);
        next
    }

    /// Decode a slice of the doubled space into ASCII, mainly for logging.
    #[allow(dead_code)]
    pub fn seq_string(&self, beg: i64, end: i64) -> String {
        self.get_seq(beg, end).iter().map(|&c| decode_base(c) as char).collect()
    }
}

#[cfg(test)]
pub fn test_index(seqs: &[(&str, &[u8])]) -> RefIndex {
    RefIndex::new(seqs.iter()
                      .map(|&(n, s)| (n.to_owned(), s.to_vec()))
                      .collect(),
                  4,
                  2)
        .unwrap()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::encode_seq;

    const REF: &[u8] = b"ATTCAGGACTCGATTGCAACGTGCCTAGA";

    #[test]
    fn get_seq_forward() {
        let idx = test_index(&[("r", REF)]);
        let got = idx.get_seq(3, 9);
        assert_eq!(encode_seq(b"CAGGAC"), got);
    }

    #[test]
    fn get_seq_reverse_strand() {
        let idx = test_index(&[("r", REF)]);
        let l = idx.l_pac();
        // the reverse half holds the reverse complement of the forward
        // strand laid out left to right
        let got = idx.get_seq(l, 2 * l);
        assert_eq!(encode_seq(&bio::alphabets::dna::revcomp(REF)), got);
    }

    #[test]
    fn get_seq_rejects_straddle() {
        let idx = test_index(&[("r", REF)]);
        let l = idx.l_pac();
        assert!(idx.get_seq(l - 4, l + 4).is_empty());
    }

    #[test]
    fn get_seq_clamps() {
        let idx = test_index(&[("r", REF)]);
        let l = idx.l_pac();
        assert_eq!(l as usize, idx.get_seq(-10, l).len());
        assert_eq!(4, idx.get_seq(2 * l - 4, 2 * l + 10).len());
    }

    #[test]
    fn smem_finds_unique_substring() {
        let idx = test_index(&[("r", REF)]);
        let fmd = idx.fmd();
        let query = encode_seq(&REF[5..17]);
        let (next, smems) = idx.smem1(&fmd, &query, 0, 32, 1);
        assert_eq!(query.len(), next);
        assert_eq!(1, smems.len());
        let m = &smems[0];
        assert_eq!((0, query.len() as i32), (m.qbeg, m.qend));
        assert_eq!(1, m.occ);
        assert_eq!(vec![5], idx.sa_positions(&m.sai));
    }

    #[test]
    fn smem_reverse_strand_position() {
        let idx = test_index(&[("r", REF)]);
        let fmd = idx.fmd();
        let rc = bio::alphabets::dna::revcomp(&REF[5..17]);
        let query = encode_seq(&rc);
        let (_, smems) = idx.smem1(&fmd, &query, 0, 32, 1);
        assert_eq!(1, smems.len());
        let pos = idx.sa_positions(&smems[0].sai);
        let l = idx.l_pac();
        assert_eq!(1, pos.len());
        // hit lies on the reverse half; mapping re - 1 back gives the
        // forward start of the original window
        let (_, off, rev) = idx.pos_to_contig(pos[0] + smems[0].len() as i64 - 1);
        assert!(pos[0] >= l);
        assert!(rev);
        assert_eq!(5, off);
    }

    #[test]
    fn smem_splits_on_ambiguous_reference_mismatch() {
        let idx = test_index(&[("r", REF)]);
        let fmd = idx.fmd();
        // corrupt one base in the middle of an otherwise exact query
        let mut q = REF[4..24].to_vec();
        let pos = 9;
        q[pos] = match q[pos] {
            b'A' => b'C',
            _ => b'A',
        };
        let query = encode_seq(&q);
        let (next, smems) = idx.smem1(&fmd, &query, 0, 32, 1);
        // the longest match through position 0 ends before or at the
        // corrupted base
        assert!(next <= pos + 1);
        assert!(!smems.is_empty());
        assert!(smems.iter().all(|m| m.qbeg == 0));
        assert!(smems.iter().any(|m| m.qend as usize == pos));
    }

    #[test]
    fn smem_respects_max_len() {
        let idx = test_index(&[("r", REF)]);
        let fmd = idx.fmd();
        let query = encode_seq(&REF[2..22]);
        let (next, smems) = idx.smem1(&fmd, &query, 0, 8, 1);
        assert_eq!(8, next);
        assert!(smems.iter().all(|m| m.len() <= 8));
    }

    #[test]
    fn pos_to_contig_picks_right_record() {
        let idx = test_index(&[("a", b"ACGTACGTAC"), ("b", b"TTGCATTGCA")]);
        let (cid, off, rev) = idx.pos_to_contig(12);
        assert_eq!((1, 2, false), (cid, off, rev));
        let (cid0, off0, _) = idx.pos_to_contig(9);
        assert_eq!((0, 9), (cid0, off0));
    }

    #[test]
    fn empty_reference_is_an_error() {
        assert!(RefIndex::new(vec![], 4, 2).is_err());
        assert!(RefIndex::new(vec![("x".to_owned(), vec![])], 4, 2).is_err());
    }
}
