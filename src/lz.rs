// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Chained LZ77 compressor for byte streams.
//!
//! Token format:
//! - `[0, len, <len literal bytes>]` — literal run, `len` in 1..=255
//! - `[1, len, dist_lo, dist_hi]` — match, distance little-endian
//!
//! Match finding uses a 3-byte hash into a 64 Ki-entry head table with
//! per-position `prev` chain links. The head table is thread-local and
//! invalidated per call with an epoch counter, so it is never zeroed on the
//! hot path (only when the epoch wraps).
//!
//! A match is acceptable when `len >= 4`, or `len == 3 && dist <=
//! min_dist_len3`. Candidates tie-break on shortest distance, then longest
//! length. Strategies: 0 = greedy, 1 = lazy-1 (defer when the position
//! after yields a strictly better match), 2 = optimal parse (dynamic
//! program, gated by a lazy-1 probe and a memory cap, adopted only when it
//! beats lazy by `opt_min_gain_bytes`).

use std::cell::RefCell;

use crate::config::config;

const HASH_BITS: u32 = 16;
const HASH_SIZE: usize = 1 << HASH_BITS;
const MAX_TOKEN_LEN: usize = 255;

/// Tuning parameters for one compression call.
#[derive(Debug, Clone)]
#[allow(missing_docs)] // Fields mirror the LZ_* option names
pub struct ChainLzParams {
    pub window_size: usize,
    pub chain_depth: usize,
    pub min_dist_len3: usize,
    /// Adoption bias in permille, consumed by the filter-lo LZ probe.
    pub bias_permille: u32,
    pub nice_length: usize,
    /// 0 = greedy, 1 = lazy-1, 2 = optimal parse.
    pub match_strategy: u8,
    pub opt_max_matches: usize,
    pub opt_lit_max: usize,
    pub opt_memcap_mb: usize,
    pub opt_probe_src_max_bytes: usize,
    pub opt_probe_ratio_min_x1000: u64,
    pub opt_probe_ratio_max_x1000: u64,
    pub opt_min_gain_bytes: usize,
}

impl Default for ChainLzParams {
    fn default() -> Self {
        Self {
            window_size: 65535,
            chain_depth: 32,
            min_dist_len3: 128,
            bias_permille: 990,
            nice_length: 255,
            match_strategy: 0,
            opt_max_matches: 4,
            opt_lit_max: 128,
            opt_memcap_mb: 64,
            opt_probe_src_max_bytes: 2 * 1024 * 1024,
            opt_probe_ratio_min_x1000: 20,
            opt_probe_ratio_max_x1000: 80,
            opt_min_gain_bytes: 512,
        }
    }
}

impl ChainLzParams {
    /// Parameters from the frozen environment snapshot.
    pub fn from_config() -> Self {
        let c = config();
        Self {
            window_size: usize::from(c.lz_window_size),
            chain_depth: usize::from(c.lz_chain_depth),
            min_dist_len3: usize::from(c.lz_min_dist_len3),
            bias_permille: u32::from(c.lz_bias_permille),
            nice_length: usize::from(c.lz_nice_length),
            match_strategy: c.lz_match_strategy,
            opt_max_matches: usize::from(c.lz_opt_max_matches),
            opt_lit_max: usize::from(c.lz_opt_lit_max),
            opt_memcap_mb: c.lz_opt_memcap_mb as usize,
            opt_probe_src_max_bytes: c.lz_opt_probe_src_max_bytes as usize,
            opt_probe_ratio_min_x1000: u64::from(c.lz_opt_probe_ratio_min_x1000),
            opt_probe_ratio_max_x1000: u64::from(c.lz_opt_probe_ratio_max_x1000),
            opt_min_gain_bytes: c.lz_opt_min_gain_bytes as usize,
        }
    }
}

/// Per-call and accumulated compressor counters.
#[derive(Debug, Default, Clone)]
#[allow(missing_docs)] // Counter names are the documentation
pub struct ChainLzCounters {
    pub calls: u64,
    pub src_bytes: u64,
    pub out_bytes: u64,
    pub match_count: u64,
    pub match_bytes: u64,
    pub literal_bytes: u64,
    pub chain_steps: u64,
    pub depth_limit_hits: u64,
    pub early_maxlen_hits: u64,
    pub nice_cutoff_hits: u64,
    pub len3_reject_dist: u64,
    pub optparse_enabled: u64,
    pub optparse_fallback_count: u64,
    pub optparse_fallback_memcap: u64,
    pub optparse_fallback_allocfail: u64,
    pub optparse_fallback_unreachable: u64,
    pub optparse_dp_positions: u64,
    pub optparse_lit_edges_eval: u64,
    pub optparse_match_edges_eval: u64,
    pub optparse_tokens_litrun: u64,
    pub optparse_tokens_match: u64,
    pub optparse_chose_shorter_than_longest: u64,
    pub optparse_probe_accept: u64,
    pub optparse_probe_reject: u64,
    pub optparse_adopt: u64,
    pub optparse_reject_small_gain: u64,
}

impl ChainLzCounters {
    /// Fold in everything, including the I/O totals.
    pub fn accumulate_from(&mut self, other: &ChainLzCounters) {
        self.calls += other.calls;
        self.src_bytes += other.src_bytes;
        self.out_bytes += other.out_bytes;
        self.accumulate_search(other);
    }

    /// Fold in search statistics only. Used when a nested strategy pass ran
    /// over the same source, so calls/src/out must not double-count.
    fn accumulate_search(&mut self, other: &ChainLzCounters) {
        self.match_count += other.match_count;
        self.match_bytes += other.match_bytes;
        self.literal_bytes += other.literal_bytes;
        self.chain_steps += other.chain_steps;
        self.depth_limit_hits += other.depth_limit_hits;
        self.early_maxlen_hits += other.early_maxlen_hits;
        self.nice_cutoff_hits += other.nice_cutoff_hits;
        self.len3_reject_dist += other.len3_reject_dist;
        self.optparse_enabled += other.optparse_enabled;
        self.optparse_fallback_count += other.optparse_fallback_count;
        self.optparse_fallback_memcap += other.optparse_fallback_memcap;
        self.optparse_fallback_allocfail += other.optparse_fallback_allocfail;
        self.optparse_fallback_unreachable += other.optparse_fallback_unreachable;
        self.optparse_dp_positions += other.optparse_dp_positions;
        self.optparse_lit_edges_eval += other.optparse_lit_edges_eval;
        self.optparse_match_edges_eval += other.optparse_match_edges_eval;
        self.optparse_tokens_litrun += other.optparse_tokens_litrun;
        self.optparse_tokens_match += other.optparse_tokens_match;
        self.optparse_chose_shorter_than_longest += other.optparse_chose_shorter_than_longest;
        self.optparse_probe_accept += other.optparse_probe_accept;
        self.optparse_probe_reject += other.optparse_probe_reject;
        self.optparse_adopt += other.optparse_adopt;
        self.optparse_reject_small_gain += other.optparse_reject_small_gain;
    }
}

/// Thread-local match-finder state. The head table is validated per call by
/// epoch; `prev` is sized on demand and fully rewritten as positions are
/// inserted, so it needs no invalidation.
struct HashState {
    head: Vec<i32>,
    head_epoch: Vec<u32>,
    epoch: u32,
    prev: Vec<i32>,
}

impl HashState {
    fn new() -> Self {
        Self {
            head: vec![0; HASH_SIZE],
            head_epoch: vec![0; HASH_SIZE],
            epoch: 0,
            prev: Vec::new(),
        }
    }

    /// Start a fresh call: bump the epoch (zeroing only on wrap) and make
    /// sure `prev` covers `src_len` positions.
    fn begin(&mut self, src_len: usize) {
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.head_epoch.fill(0);
            self.epoch = 1;
        }
        if self.prev.len() < src_len {
            self.prev.resize(src_len, -1);
        }
    }

    #[inline]
    fn head_get(&self, h: u32) -> i32 {
        if self.head_epoch[h as usize] == self.epoch {
            self.head[h as usize]
        } else {
            -1
        }
    }

    #[inline]
    fn head_set(&mut self, h: u32, pos: i32) {
        self.head_epoch[h as usize] = self.epoch;
        self.head[h as usize] = pos;
    }
}

thread_local! {
    static HASH_STATE: RefCell<HashState> = RefCell::new(HashState::new());
}

#[inline]
fn hash3(s: &[u8], pos: usize) -> u32 {
    let v = (u32::from(s[pos]) << 16) | (u32::from(s[pos + 1]) << 8) | u32::from(s[pos + 2]);
    v.wrapping_mul(0x1e35_a7bd) >> (32 - HASH_BITS)
}

/// Extend a confirmed 3-byte match; capped at the 255-byte token limit.
#[inline]
fn match_len_from(s: &[u8], ref_pos: usize, cur_pos: usize) -> usize {
    let max_len = MAX_TOKEN_LEN.min(s.len() - cur_pos);
    let a = &s[ref_pos + 3..ref_pos + max_len];
    let b = &s[cur_pos + 3..cur_pos + max_len];
    3 + a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[derive(Default, Clone, Copy)]
struct MatchSearchResult {
    len: usize,
    dist: usize,
    depth_limit_hit: bool,
    early_maxlen_hit: bool,
    nice_cutoff_hit: bool,
}

/// Walk the hash chain at `cur_pos` and keep the best acceptable match.
fn find_best_match(
    s: &[u8],
    cur_pos: usize,
    state: &HashState,
    p: &ChainLzParams,
    counters: &mut ChainLzCounters,
) -> MatchSearchResult {
    let mut result = MatchSearchResult::default();
    if cur_pos + 2 >= s.len() {
        return result;
    }
    let mut r = state.head_get(hash3(s, cur_pos));
    let mut depth = 0;
    while r >= 0 && depth < p.chain_depth {
        counters.chain_steps += 1;
        let ref_pos = r as usize;
        let dist = cur_pos - ref_pos;
        if dist > p.window_size {
            break;
        }
        if dist > 0 && s[ref_pos] == s[cur_pos] && s[ref_pos + 1] == s[cur_pos + 1] && s[ref_pos + 2] == s[cur_pos + 2]
        {
            let len = if cur_pos + 3 < s.len() && s[ref_pos + 3] == s[cur_pos + 3] {
                match_len_from(s, ref_pos, cur_pos)
            } else {
                3
            };
            let acceptable = len >= 4 || (len == 3 && dist <= p.min_dist_len3);
            if !acceptable && len == 3 && dist > p.min_dist_len3 {
                counters.len3_reject_dist += 1;
            }
            if acceptable && (len > result.len || (len == result.len && dist < result.dist)) {
                result.len = len;
                result.dist = dist;
                if result.len == MAX_TOKEN_LEN {
                    result.early_maxlen_hit = true;
                    break;
                }
                if result.len >= p.nice_length {
                    result.nice_cutoff_hit = true;
                    break;
                }
            }
        }
        r = state.prev[ref_pos];
        depth += 1;
    }
    if !result.early_maxlen_hit && r >= 0 && depth >= p.chain_depth {
        result.depth_limit_hit = true;
    }
    if result.depth_limit_hit {
        counters.depth_limit_hits += 1;
    }
    if result.early_maxlen_hit {
        counters.early_maxlen_hits += 1;
    }
    if result.nice_cutoff_hit {
        counters.nice_cutoff_hits += 1;
    }
    result
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct OptTok {
    kind: u8, // 0 = litrun, 1 = match
    len: u8,
    dist: u16,
}

/// Deterministic preference for equal-cost DP predecessors.
fn opt_tok_prefer(a: &OptTok, b: &OptTok) -> bool {
    if a.kind != b.kind {
        return a.kind > b.kind; // prefer match over litrun
    }
    if a.kind == 1 {
        if a.len != b.len {
            return a.len > b.len;
        }
        return a.dist < b.dist;
    }
    a.len > b.len
}

#[derive(Clone, Copy, Default)]
struct MatchCandidate {
    len: u8,
    dist: u16,
}

fn try_alloc<T: Clone>(len: usize, val: T) -> Option<Vec<T>> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, val);
    Some(v)
}

const INF_COST: u64 = u64::MAX / 4;

/// Optimal (DP) parse. Returns None when the caller should fall back to the
/// lazy output: memory cap exceeded, allocation refused, or an internal
/// inconsistency in the back-walk.
#[allow(clippy::too_many_lines)] // One dynamic program; splitting it would scatter the state tables
#[allow(clippy::cast_possible_truncation)] // Token fields are range-checked before narrowing
fn compress_optparse(src: &[u8], p: &ChainLzParams, counters: &mut ChainLzCounters) -> Option<Vec<u8>> {
    if src.is_empty() {
        return Some(Vec::new());
    }
    let src_size = src.len();
    let state_count = src_size + 1;

    // DP state is roughly 32 bytes per position across the tables below.
    let approx_bytes = state_count * 32;
    let memcap_bytes = p.opt_memcap_mb.max(1) * 1024 * 1024;
    if approx_bytes > memcap_bytes {
        counters.optparse_fallback_count += 1;
        counters.optparse_fallback_memcap += 1;
        return None;
    }

    let alloc = (|| {
        Some((
            try_alloc(state_count, INF_COST)?,
            try_alloc(state_count, u32::MAX)?,
            try_alloc(state_count, u32::MAX)?,
            try_alloc(state_count, -1i32)?,
            try_alloc(state_count, OptTok::default())?,
            try_alloc(src_size, 0u8)?,
            try_alloc(state_count, 0u64)?,
        ))
    })();
    let Some((mut dp_cost, mut dp_bytes, mut dp_tokens, mut prev_pos, mut prev_tok, mut longest_at, mut lit_prefix)) =
        alloc
    else {
        counters.optparse_fallback_count += 1;
        counters.optparse_fallback_allocfail += 1;
        return None;
    };

    // Per-byte entropy proxy, Q8 fixed point: 1 byte ~ 8 bits.
    let byte_cost = [256u64; 256];
    for i in 0..src_size {
        lit_prefix[i + 1] = lit_prefix[i] + byte_cost[usize::from(src[i])];
    }

    let opt_max_matches = p.opt_max_matches.clamp(1, 32);
    let opt_lit_max = p.opt_lit_max.max(1);

    dp_cost[0] = 0;
    dp_bytes[0] = 0;
    dp_tokens[0] = 0;

    HASH_STATE.with(|cell| {
        let mut state = cell.borrow_mut();
        state.begin(src_size);

        let mut cands = [MatchCandidate::default(); 32];

        for pos in 0..src_size {
            if dp_cost[pos] < u64::MAX / 8 {
                counters.optparse_dp_positions += 1;

                let max_lit = MAX_TOKEN_LEN.min(opt_lit_max).min(src_size - pos);
                counters.optparse_lit_edges_eval += max_lit as u64;
                for len in 1..=max_lit {
                    let next = pos + len;
                    let body = lit_prefix[next] - lit_prefix[pos];
                    let token_cost = byte_cost[0] + byte_cost[len & 0xFF] + body;
                    relax(
                        &mut dp_cost,
                        &mut dp_bytes,
                        &mut dp_tokens,
                        &mut prev_pos,
                        &mut prev_tok,
                        pos,
                        next,
                        OptTok {
                            kind: 0,
                            len: len as u8,
                            dist: 0,
                        },
                        token_cost,
                        (2 + len) as u32,
                    );
                }

                let (cand_count, longest_len) =
                    collect_matches(src, pos, &state, p, opt_max_matches, &mut cands, counters);
                longest_at[pos] = longest_len.min(MAX_TOKEN_LEN) as u8;
                counters.optparse_match_edges_eval += cand_count as u64;
                for c in cands.iter().take(cand_count) {
                    let len = usize::from(c.len);
                    let next = pos + len;
                    if next > src_size {
                        continue;
                    }
                    let token_cost = byte_cost[1]
                        + byte_cost[len & 0xFF]
                        + byte_cost[usize::from(c.dist & 0xFF)]
                        + byte_cost[usize::from(c.dist >> 8)];
                    relax(
                        &mut dp_cost,
                        &mut dp_bytes,
                        &mut dp_tokens,
                        &mut prev_pos,
                        &mut prev_tok,
                        pos,
                        next,
                        OptTok {
                            kind: 1,
                            len: c.len,
                            dist: c.dist,
                        },
                        token_cost,
                        4,
                    );
                }
            }

            if pos + 2 < src_size {
                let h = hash3(src, pos);
                let head = state.head_get(h);
                state.prev[pos] = head;
                state.head_set(h, pos as i32);
            }
        }
    });

    if dp_cost[src_size] >= u64::MAX / 8 {
        counters.optparse_fallback_count += 1;
        counters.optparse_fallback_unreachable += 1;
        return None;
    }

    // Walk predecessors back from the final state.
    let mut tokens: Vec<OptTok> = Vec::with_capacity(dp_tokens[src_size] as usize);
    let mut cur = src_size;
    while cur > 0 {
        let pre = prev_pos[cur];
        if pre < 0 {
            counters.optparse_fallback_count += 1;
            counters.optparse_fallback_unreachable += 1;
            return None;
        }
        tokens.push(prev_tok[cur]);
        cur = pre as usize;
    }
    tokens.reverse();

    let mut out = Vec::with_capacity(dp_bytes[src_size] as usize + 8);
    let mut pos_idx = 0usize;
    for tok in &tokens {
        let start_pos = pos_idx;
        if tok.kind == 0 {
            out.push(0);
            out.push(tok.len);
            out.extend_from_slice(&src[pos_idx..pos_idx + usize::from(tok.len)]);
            pos_idx += usize::from(tok.len);
            counters.literal_bytes += u64::from(tok.len);
            counters.optparse_tokens_litrun += 1;
        } else {
            out.push(1);
            out.push(tok.len);
            out.push((tok.dist & 0xFF) as u8);
            out.push((tok.dist >> 8) as u8);
            pos_idx += usize::from(tok.len);
            counters.match_count += 1;
            counters.match_bytes += u64::from(tok.len);
            counters.optparse_tokens_match += 1;
            if longest_at[start_pos] > tok.len {
                counters.optparse_chose_shorter_than_longest += 1;
            }
        }
    }

    if pos_idx != src_size {
        counters.optparse_fallback_count += 1;
        counters.optparse_fallback_unreachable += 1;
        return None;
    }
    Some(out)
}

/// Collect up to `opt_max_matches` acceptable candidates at `cur_pos`,
/// sorted by length descending then distance ascending.
fn collect_matches(
    s: &[u8],
    cur_pos: usize,
    state: &HashState,
    p: &ChainLzParams,
    opt_max_matches: usize,
    cands: &mut [MatchCandidate; 32],
    counters: &mut ChainLzCounters,
) -> (usize, usize) {
    let mut cand_count = 0usize;
    let mut longest_len = 0usize;
    if cur_pos + 2 >= s.len() {
        return (0, 0);
    }
    let mut r = state.head_get(hash3(s, cur_pos));
    let mut depth = 0;
    while r >= 0 && depth < p.chain_depth {
        counters.chain_steps += 1;
        let ref_pos = r as usize;
        let dist = cur_pos - ref_pos;
        if dist > p.window_size {
            break;
        }
        if dist > 0 && s[ref_pos] == s[cur_pos] && s[ref_pos + 1] == s[cur_pos + 1] && s[ref_pos + 2] == s[cur_pos + 2]
        {
            let len = if cur_pos + 3 < s.len() && s[ref_pos + 3] == s[cur_pos + 3] {
                match_len_from(s, ref_pos, cur_pos)
            } else {
                3
            };
            let acceptable = len >= 4 || (len == 3 && dist <= p.min_dist_len3);
            if !acceptable && len == 3 && dist > p.min_dist_len3 {
                counters.len3_reject_dist += 1;
            }
            if acceptable {
                longest_len = longest_len.max(len);
                #[allow(clippy::cast_possible_truncation)] // len <= 255, dist <= 65535
                let m = MatchCandidate {
                    len: len as u8,
                    dist: dist as u16,
                };
                let duplicate = cands[..cand_count].iter().any(|c| c.len == m.len && c.dist == m.dist);
                if !duplicate {
                    if cand_count < opt_max_matches {
                        cands[cand_count] = m;
                        cand_count += 1;
                    } else {
                        let mut worst = 0;
                        for i in 1..cand_count {
                            if cands[i].len < cands[worst].len
                                || (cands[i].len == cands[worst].len && cands[i].dist > cands[worst].dist)
                            {
                                worst = i;
                            }
                        }
                        if m.len > cands[worst].len || (m.len == cands[worst].len && m.dist < cands[worst].dist) {
                            cands[worst] = m;
                        }
                    }
                }
                if len == MAX_TOKEN_LEN {
                    counters.early_maxlen_hits += 1;
                    break;
                }
                if len >= p.nice_length {
                    counters.nice_cutoff_hits += 1;
                    break;
                }
            }
        }
        r = state.prev[ref_pos];
        depth += 1;
    }
    if r >= 0 && depth >= p.chain_depth {
        counters.depth_limit_hits += 1;
    }
    cands[..cand_count].sort_by(|a, b| b.len.cmp(&a.len).then(a.dist.cmp(&b.dist)));
    (cand_count, longest_len)
}

#[allow(clippy::too_many_arguments)] // DP tables are deliberately parallel arrays
fn relax(
    dp_cost: &mut [u64],
    dp_bytes: &mut [u32],
    dp_tokens: &mut [u32],
    prev_pos: &mut [i32],
    prev_tok: &mut [OptTok],
    from: usize,
    to: usize,
    tok: OptTok,
    delta_cost: u64,
    delta_bytes: u32,
) {
    let from_cost = dp_cost[from];
    if from_cost >= u64::MAX / 8 {
        return;
    }
    let new_cost = from_cost + delta_cost;
    let new_bytes = dp_bytes[from] + delta_bytes;
    let new_tokens = dp_tokens[from] + 1;

    let take = match new_cost.cmp(&dp_cost[to]) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Equal => match new_bytes.cmp(&dp_bytes[to]) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => match new_tokens.cmp(&dp_tokens[to]) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Equal => prev_pos[to] >= 0 && opt_tok_prefer(&tok, &prev_tok[to]),
                std::cmp::Ordering::Greater => false,
            },
            std::cmp::Ordering::Greater => false,
        },
        std::cmp::Ordering::Greater => false,
    };
    if !take {
        return;
    }
    dp_cost[to] = new_cost;
    dp_bytes[to] = new_bytes;
    dp_tokens[to] = new_tokens;
    #[allow(clippy::cast_possible_truncation)] // Positions bounded by opt_probe_src_max_bytes
    {
        prev_pos[to] = from as i32;
    }
    prev_tok[to] = tok;
}

/// Compress `src` into the chained-LZ token stream.
///
/// Never fails: strategy 2 degrades to its internal lazy-1 pass when the
/// optimal parse is gated off, over budget, or not enough of a win, with the
/// reason recorded in `counters`.
#[allow(clippy::cast_possible_truncation)] // Token fields are range-checked before narrowing
pub fn compress(src: &[u8], p: &ChainLzParams, counters: &mut ChainLzCounters) -> Vec<u8> {
    if src.is_empty() {
        return Vec::new();
    }
    let src_size = src.len();
    counters.calls += 1;
    counters.src_bytes += src_size as u64;

    if p.match_strategy == 2 {
        let mut lazy_params = p.clone();
        lazy_params.match_strategy = 1;

        let mut lazy_counters = ChainLzCounters::default();
        let lazy_out = compress(src, &lazy_params, &mut lazy_counters);

        let ratio_x1000 = (lazy_out.len() as u64 * 1000) / src_size as u64;
        let probe_pass = src_size <= p.opt_probe_src_max_bytes
            && ratio_x1000 >= p.opt_probe_ratio_min_x1000
            && ratio_x1000 <= p.opt_probe_ratio_max_x1000;
        if !probe_pass {
            counters.optparse_probe_reject += 1;
            counters.accumulate_search(&lazy_counters);
            counters.out_bytes += lazy_out.len() as u64;
            return lazy_out;
        }

        counters.optparse_probe_accept += 1;
        counters.optparse_enabled += 1;

        let mut opt_counters = ChainLzCounters::default();
        match compress_optparse(src, p, &mut opt_counters) {
            Some(opt_out) => {
                if opt_out.len() + p.opt_min_gain_bytes <= lazy_out.len() {
                    counters.optparse_adopt += 1;
                    counters.accumulate_search(&opt_counters);
                    counters.out_bytes += opt_out.len() as u64;
                    return opt_out;
                }
                counters.optparse_reject_small_gain += 1;
            }
            None => {
                counters.accumulate_search(&opt_counters);
            }
        }

        counters.accumulate_search(&lazy_counters);
        counters.out_bytes += lazy_out.len() as u64;
        return lazy_out;
    }

    let use_lazy1 = p.match_strategy == 1;
    let worst_lit_chunks = src_size.div_ceil(MAX_TOKEN_LEN);
    let mut out = Vec::with_capacity(src_size + worst_lit_chunks * 2 + 64);

    HASH_STATE.with(|cell| {
        let mut state = cell.borrow_mut();
        state.begin(src_size);

        let mut pos = 0usize;
        let mut lit_start = 0usize;
        while pos + 2 < src_size {
            let h = hash3(src, pos);
            let best = find_best_match(src, pos, &state, p, counters);

            let head = state.head_get(h);
            state.prev[pos] = head;
            state.head_set(h, pos as i32);

            let mut defer_to_next = false;
            if use_lazy1 && best.len > 0 && pos + 3 < src_size {
                let next = find_best_match(src, pos + 1, &state, p, counters);
                if next.len > best.len || (next.len == best.len && next.len > 0 && next.dist < best.dist) {
                    defer_to_next = true;
                }
            }

            if best.len > 0 && !defer_to_next {
                flush_literals(src, lit_start, pos, &mut out, counters);
                out.push(1);
                out.push(best.len as u8);
                out.push((best.dist & 0xFF) as u8);
                out.push((best.dist >> 8) as u8);
                counters.match_count += 1;
                counters.match_bytes += best.len as u64;

                // Register the interior of the match so later chains see it.
                for i in 1..best.len {
                    let q = pos + i;
                    if q + 2 >= src_size {
                        break;
                    }
                    let h2 = hash3(src, q);
                    let head2 = state.head_get(h2);
                    state.prev[q] = head2;
                    state.head_set(h2, q as i32);
                }

                pos += best.len;
                lit_start = pos;
            } else {
                pos += 1;
            }
        }
        flush_literals(src, lit_start, src_size, &mut out, counters);
    });

    counters.out_bytes += out.len() as u64;
    out
}

#[allow(clippy::cast_possible_truncation)] // Chunk length capped at 255
fn flush_literals(src: &[u8], start: usize, end: usize, out: &mut Vec<u8>, counters: &mut ChainLzCounters) {
    let mut cur = start;
    while cur < end {
        let chunk = MAX_TOKEN_LEN.min(end - cur);
        out.push(0);
        out.push(chunk as u8);
        out.extend_from_slice(&src[cur..cur + chunk]);
        counters.literal_bytes += chunk as u64;
        cur += chunk;
    }
}

/// Expand a token stream back into bytes. Returns `None` on a malformed
/// stream (truncated token, zero/forward distance).
pub fn decompress(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut pos = 0usize;
    while pos < data.len() {
        let kind = data[pos];
        match kind {
            0 => {
                let len = usize::from(*data.get(pos + 1)?);
                if len == 0 || pos + 2 + len > data.len() {
                    return None;
                }
                out.extend_from_slice(&data[pos + 2..pos + 2 + len]);
                pos += 2 + len;
            }
            1 => {
                if pos + 4 > data.len() {
                    return None;
                }
                let len = usize::from(data[pos + 1]);
                let dist = usize::from(u16::from_le_bytes([data[pos + 2], data[pos + 3]]));
                if len == 0 || dist == 0 || dist > out.len() {
                    return None;
                }
                // Byte-wise copy: overlapping matches (dist < len) repeat.
                let src_start = out.len() - dist;
                for i in 0..len {
                    let b = out[src_start + i];
                    out.push(b);
                }
                pos += 4;
            }
            _ => return None,
        }
    }
    Some(out)
}
