//! Serializing alignment regions as single-end SAM records.

use std::fmt::Write as FmtWrite; // for write!(String, ...)

use crate::index::RefIndex;
use crate::opts::{MapOpts, FLAG_HARDCLIP};
use crate::region::{approx_mapq, AlnReg};
use crate::sw;
use crate::util::decode_base;

const SAM_UNMAPPED: u32 = 0x4;
const SAM_REVERSE: u32 = 0x10;
const SAM_SECONDARY: u32 = 0x100;

/// `@SQ` lines for every contig plus a `@PG` line.
pub fn header(index: &RefIndex) -> String {
    let mut h = String::new();
    for c in index.contigs() {
        let _ = writeln!(h, "@SQ\tSN:{}\tLN:{}", c.name, c.len);
    }
    let _ = writeln!(h,
                     "@PG\tID:rmem\tPN:rmem\tVN:{}",
                     env!("CARGO_PKG_VERSION"));
    h
}

/// Global alignment of the clipped query against its reference window,
/// reported as a CIGAR. `None` when the window is invalid (strand straddle,
/// clamped fetch) or the alignment degenerates to nothing.
fn gen_cigar(opts: &MapOpts,
             index: &RefIndex,
             query: &[u8],
             rb: i64,
             re: i64)
             -> Option<(i32, sw::Cigar)> {
    let l_pac = index.l_pac();
    if query.is_empty() || rb >= re || (rb < l_pac && re > l_pac) {
        return None;
    }
    let mut rseq = index.get_seq(rb, re);
    if rseq.len() as i64 != re - rb {
        return None;
    }
    let mut query = query.to_vec();
    if rb >= l_pac {
        // align in forward-strand orientation so indels land leftmost
        query.reverse();
        rseq.reverse();
    }
    let band = {
        let gaps = ((query.len() as f64 * opts.a as f64 - opts.q as f64) / opts.r as f64
                    + 1.0) as i32;
        gaps.min(opts.w).max(1) + (rseq.len() as i32 - query.len() as i32).abs()
    };
    let (score, cigar) = sw::global(&query, &rseq, &opts.mat, opts.q, opts.r, band);
    if cigar.is_empty() {
        return None;
    }
    Some((score, cigar))
}

fn push_clip(line: &mut String, len: i32, hard: bool) {
    if len > 0 {
        let _ = write!(line, "{}{}", len, if hard { 'H' } else { 'S' });
    }
}

/// Append one SAM record for `reg` (or an unmapped record when `None`).
fn append_record(line: &mut String,
                 opts: &MapOpts,
                 index: &RefIndex,
                 name: &str,
                 seq: &[u8],
                 qual: Option<&[u8]>,
                 reg: Option<&AlnReg>,
                 mapq: i32) {
    let l_pac = index.l_pac();
    let l_seq = seq.len() as i32;
    let hard = opts.flag & FLAG_HARDCLIP != 0;

    let mapped = reg.map_or(false, |a| a.rb >= 0 && a.rb < a.re && a.re <= l_pac << 1);
    let mut flag = 0u32;
    let mut cigar = None;
    if let (true, Some(a)) = (mapped, reg) {
        cigar = gen_cigar(opts,
                          index,
                          &seq[a.qb as usize..a.qe as usize],
                          a.rb,
                          a.re);
        if cigar.is_none() {
            flag |= SAM_UNMAPPED;
        }
        if a.rb >= l_pac {
            flag |= SAM_REVERSE;
        }
        if !a.is_primary() {
            flag |= SAM_SECONDARY;
        }
    } else {
        flag |= SAM_UNMAPPED;
    }

    let _ = write!(line, "{}\t{}", name, flag);
    let is_rev = flag & SAM_REVERSE != 0;

    if let (true, Some(a)) = (mapped, reg) {
        let depos = if a.rb < l_pac { a.rb } else { a.re - 1 };
        let (cid, off, _) = index.pos_to_contig(depos);
        let _ = write!(line,
                       "\t{}\t{}\t{}\t",
                       index.contigs()[cid].name,
                       off + 1,
                       mapq);
        match cigar {
            Some((_, ref ops)) => {
                let clip5 = if is_rev { l_seq - a.qe } else { a.qb };
                let clip3 = if is_rev { a.qb } else { l_seq - a.qe };
                push_clip(line, clip5, hard);
                for &(op, len) in ops {
                    let _ = write!(line, "{}{}", len, op as char);
                }
                push_clip(line, clip3, hard);
            },
            None => line.push('*'),
        }
    } else {
        line.push_str("\t*\t0\t0\t*");
    }
    line.push_str("\t*\t0\t0\t");

    // clipped bases disappear from the record under hard clipping
    let (qb, qe) = match (reg, mapped && hard && flag & SAM_UNMAPPED == 0) {
        (Some(a), true) => (a.qb as usize, a.qe as usize),
        _ => (0, seq.len()),
    };
    if is_rev {
        for i in (qb..qe).rev() {
            let c = seq[i];
            line.push(decode_base(if c < 4 { 3 - c } else { c }) as char);
        }
    } else {
        for i in qb..qe {
            line.push(decode_base(seq[i]) as char);
        }
    }
    line.push('\t');
    match qual {
        Some(q) => {
            if is_rev {
                for i in (qb..qe).rev() {
                    line.push(q[i] as char);
                }
            } else {
                for i in qb..qe {
                    line.push(q[i] as char);
                }
            }
        },
        None => line.push('*'),
    }

    if let Some(a) = reg {
        let _ = write!(line, "\tAS:i:{}", a.score);
        let _ = write!(line, "\tXS:i:{}", a.sub.max(a.csub));
    }
    line.push('\n');
}

/// All single-end records of one read: its primary regions, or one unmapped
/// record when nothing aligned. Secondaries are skipped.
pub fn sam_se(opts: &MapOpts,
              index: &RefIndex,
              name: &str,
              seq: &[u8],
              qual: Option<&[u8]>,
              regs: &[AlnReg])
              -> String {
    let mut out = String::new();
    let mut wrote = false;
    for a in regs.iter().filter(|a| a.is_primary()) {
        let mapq = approx_mapq(opts, a);
        append_record(&mut out, opts, index, name, seq, qual, Some(a), mapq);
        wrote = true;
    }
    if !wrote {
        append_record(&mut out, opts, index, name, seq, qual, None, 0);
    }
    out
}
