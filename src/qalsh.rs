//! QALSH (C3): Query-Aware LSH for range-bounded nearest-neighbour search.
//!
//! `M` random 1-D projections are each stored as a hash table of `(id,
//! projection value)` pairs sorted ascending by projection value; a query
//! is answered by walking outward from each table's insertion point and
//! counting, per candidate item, how many of the `M` tables it collided on,
//! expanding the search radius in rounds until enough candidates are found
//! or every table has exhausted its range. Grounded directly on
//! `original_source/kmips/qalsh.cc`/`curves/qalsh.h`; translated from the
//! C++ dynamic-collision-counting loop into the equivalent safe Rust.
use crate::math::new_cdf;
use crate::rng::gaussian_vec;
use rand::Rng;

/// Candidates produced by QALSH beyond this count are not useful to the
/// verification routine; mirrors the original's `CANDIDATES`.
pub const CANDIDATES: usize = 100;
/// Cursor step per round, per side, per table.
pub const SCAN_SIZE: usize = 64;
/// Approximation ratio used for the NN reduction inside H2-ALSH (spec §4.4).
pub const DEFAULT_C0: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: f32,
    id: u32,
}

pub struct Qalsh {
    n: usize,
    d: usize,
    c0: f64,
    w: f64,
    m: usize,
    l: usize,
    /// `m` projection vectors of length `d`, flattened row-major.
    projections: Vec<f32>,
    /// `m` tables, each holding `n` entries sorted ascending by `key`.
    tables: Vec<Vec<Entry>>,
}

impl Qalsh {
    /// Builds a QALSH index over `n` vectors of dimension `d`, stored
    /// row-major in `data` (length `n * d`).
    pub fn build<R: Rng + ?Sized>(data: &[f32], n: usize, d: usize, c0: f64, rng: &mut R) -> Self {
        assert_eq!(data.len(), n * d);
        let w = (8.0 * c0 * c0 * c0.ln() / (c0 * c0 - 1.0)).sqrt();

        let p1 = new_cdf(w / 2.0, 0.001);
        let p2 = new_cdf(w / (2.0 * c0), 0.001);
        let beta = CANDIDATES as f64 / n.max(1) as f64;
        let delta = 1.0 / std::f64::consts::E;

        let para1 = (2.0f64 / beta).ln().sqrt();
        let para2 = (1.0f64 / delta).ln().sqrt();
        let para3 = 2.0 * (p1 - p2) * (p1 - p2);
        let eta = para1 / para2;
        let alpha = (eta * p1 + p2) / (1.0 + eta);

        let m = ((para1 + para2).powi(2) / para3).ceil().max(1.0) as usize;
        let l = ((alpha * m as f64).ceil().max(1.0)) as usize;

        let projections = gaussian_vec(rng, m * d);

        let mut tables = Vec::with_capacity(m);
        for j in 0..m {
            let proj = &projections[j * d..(j + 1) * d];
            let mut entries: Vec<Entry> = data
                .chunks_exact(d)
                .enumerate()
                .map(|(id, row)| Entry {
                    key: crate::math::inner_product(proj, row),
                    id: id as u32,
                })
                .collect();
            entries.sort_by(|a, b| a.key.partial_cmp(&b.key).unwrap());
            tables.push(entries);
        }

        log::debug!(
            "qalsh build: n={} d={} c0={:.2} w={:.4} m={} l={}",
            n,
            d,
            c0,
            w,
            m,
            l
        );

        Qalsh {
            n,
            d,
            c0,
            w,
            m,
            l,
            projections,
            tables,
        }
    }

    pub fn num_tables(&self) -> usize {
        self.m
    }

    pub fn collision_threshold(&self) -> usize {
        self.l
    }

    /// Heap bytes held by the projection vectors and the `m` sorted tables;
    /// SPEC_FULL.md §C.1's `memory_estimate`.
    pub fn memory_bytes(&self) -> usize {
        let projections = self.projections.len() * std::mem::size_of::<f32>();
        let tables: usize = self
            .tables
            .iter()
            .map(|t| t.len() * std::mem::size_of::<Entry>())
            .sum();
        projections + tables
    }

    fn hash_value(&self, table: usize, query: &[f32]) -> f32 {
        let proj = &self.projections[table * self.d..(table + 1) * self.d];
        crate::math::inner_product(proj, query)
    }

    /// Range-bounded approximate k-nn search: returns up to `CANDIDATES + k -
    /// 1` local item ids whose hash collides on at least `l` of the `m`
    /// tables within range `r`. Ordering is unspecified.
    pub fn knn_candidates(&self, k: usize, r: f32, query: &[f32]) -> Vec<u32> {
        self.dynamic_collision_counting(k, Some(r as f64), query)
    }

    /// Range-free variant: equivalent to `knn_candidates` with `r = infinity`
    /// -- drops the range-exhaustion bookkeeping, since a table's bucket can
    /// never exceed an infinite range.
    pub fn knn_candidates_unbounded(&self, k: usize, query: &[f32]) -> Vec<u32> {
        self.dynamic_collision_counting(k, None, query)
    }

    fn dynamic_collision_counting(&self, k: usize, r: Option<f64>, query: &[f32]) -> Vec<u32> {
        let cand_num = CANDIDATES + k - 1;
        let mut cand = Vec::new();
        if self.n == 0 || self.m == 0 {
            return cand;
        }

        let q_val: Vec<f32> = (0..self.m).map(|j| self.hash_value(j, query)).collect();
        let mut l_pos = vec![0i64; self.m];
        let mut r_pos = vec![0i64; self.m];
        for j in 0..self.m {
            let table = &self.tables[j];
            let pos = table.partition_point(|e| e.key < q_val[j]) as i64;
            let n = self.n as i64;
            if pos <= 0 {
                l_pos[j] = -1;
                r_pos[j] = 0;
            } else if pos >= n - 1 {
                l_pos[j] = n - 1;
                r_pos[j] = n;
            } else {
                l_pos[j] = pos;
                r_pos[j] = pos + 1;
            }
        }

        let mut freq = vec![0u32; self.n];
        let mut checked = vec![false; self.n];
        let mut r_flag = vec![true; self.m];

        let mut radius = 1.0f64;
        let mut width = radius * self.w / 2.0;
        let mut num_range = 0usize;

        loop {
            let mut b_flag = vec![true; self.m];
            let mut num_bucket = 0usize;

            'round: loop {
                for j in 0..self.m {
                    if !b_flag[j] {
                        continue;
                    }
                    let table = &self.tables[j];
                    let q_v = q_val[j];
                    let mut ldist = -1.0f64;
                    let mut rdist = -1.0f64;

                    let mut pos = l_pos[j];
                    for _ in 0..SCAN_SIZE {
                        if pos < 0 {
                            ldist = f64::MAX;
                            break;
                        }
                        ldist = (q_v as f64 - table[pos as usize].key as f64).abs();
                        let out_of_range = match r {
                            Some(range) => ldist > range * self.w / 2.0,
                            None => false,
                        };
                        if ldist > width || out_of_range {
                            break;
                        }
                        let id = table[pos as usize].id as usize;
                        freq[id] += 1;
                        if freq[id] as usize >= self.l && !checked[id] {
                            checked[id] = true;
                            cand.push(id as u32);
                            if cand.len() >= cand_num {
                                break;
                            }
                        }
                        pos -= 1;
                    }
                    l_pos[j] = pos;
                    if cand.len() >= cand_num {
                        break 'round;
                    }

                    let mut pos = r_pos[j];
                    for _ in 0..SCAN_SIZE {
                        if pos >= self.n as i64 {
                            rdist = f64::MAX;
                            break;
                        }
                        rdist = (q_v as f64 - table[pos as usize].key as f64).abs();
                        let out_of_range = match r {
                            Some(range) => rdist > range * self.w / 2.0,
                            None => false,
                        };
                        if rdist > width || out_of_range {
                            break;
                        }
                        let id = table[pos as usize].id as usize;
                        freq[id] += 1;
                        if freq[id] as usize >= self.l && !checked[id] {
                            checked[id] = true;
                            cand.push(id as u32);
                            if cand.len() >= cand_num {
                                break;
                            }
                        }
                        pos += 1;
                    }
                    r_pos[j] = pos;
                    if cand.len() >= cand_num {
                        break 'round;
                    }

                    if ldist > width && rdist > width {
                        b_flag[j] = false;
                        num_bucket += 1;
                    }
                    if let Some(range) = r {
                        let range_dist = range * self.w / 2.0;
                        if ldist > range_dist && rdist > range_dist {
                            if b_flag[j] {
                                b_flag[j] = false;
                                num_bucket += 1;
                            }
                            if r_flag[j] {
                                r_flag[j] = false;
                                num_range += 1;
                            }
                        }
                    }
                    if num_bucket > self.m || num_range > self.m || cand.len() >= cand_num {
                        break 'round;
                    }
                }
                if num_bucket >= self.m || num_range >= self.m || cand.len() >= cand_num {
                    break;
                }
            }

            let range_exhausted = r.is_some() && num_range >= self.m;
            if cand.len() >= cand_num || range_exhausted {
                break;
            }
            if let Some(range) = r {
                if radius > range {
                    break;
                }
            }

            radius *= self.c0;
            width = radius * self.w / 2.0;
        }

        cand
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rng::create_rng;

    #[test]
    fn test_build_parameters_are_positive() {
        let mut rng = create_rng(41);
        let data = vec![1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0];
        let q = Qalsh::build(&data, 3, 2, DEFAULT_C0, &mut rng);
        assert!(q.num_tables() > 0);
        assert!(q.collision_threshold() > 0);
    }

    #[test]
    fn test_query_returns_close_point() {
        let mut rng = create_rng(41);
        // 100 points on a line plus an outlier.
        let mut data = Vec::new();
        for i in 0..100 {
            data.push(i as f32 * 0.1);
            data.push(0.0);
        }
        data.push(1000.0);
        data.push(1000.0);
        let n = 101;
        let q = Qalsh::build(&data, n, 2, DEFAULT_C0, &mut rng);
        let query = [5.0f32, 0.0];
        let cand = q.knn_candidates_unbounded(5, &query);
        // the point nearest the query (id 50, value (5.0, 0.0)) must show up.
        assert!(cand.contains(&50));
    }
}
