//! Construction helper compiling a row-major description of B into the
//! dual row/column flat layout expected by [crate::FactorizedRepr].
//!
//! Host environments that already hold B in this layout can skip this and
//! pass their arrays directly.

/// Build `(row_off, row_vars, col_off, col_data, b_vals)` from per-row
/// `(variable, coefficient)` lists. Entries within a row must name distinct
/// variables; they are sorted by variable index so that every `V_j` is
/// ascending, as the representation expects.
pub fn build_layout(
    num_n: usize,
    rows: &[Vec<(usize, f64)>],
) -> (Vec<usize>, Vec<usize>, Vec<usize>, Vec<usize>, Vec<f64>) {
    let num_m = rows.len();
    let nnz: usize = rows.iter().map(|r| r.len()).sum();

    let mut row_off = Vec::with_capacity(num_m + 1);
    let mut row_vars = Vec::with_capacity(nnz);
    let mut b_vals = Vec::with_capacity(nnz);
    let mut off = 0;
    for row in rows {
        row_off.push(off);
        let mut entries = row.clone();
        entries.sort_by_key(|&(i, _)| i);
        for (i, b) in entries {
            row_vars.push(i);
            b_vals.push(b);
            off += 1;
        }
    }
    row_off.push(off);

    // Column pass: W_i ascending in j because rows are visited in order.
    let mut cols: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_n];
    for j in 0..num_m {
        for l in row_off[j]..row_off[j + 1] {
            cols[row_vars[l]].push((j, l));
        }
    }
    let mut col_off = Vec::with_capacity(num_n + 1);
    let mut col_data = Vec::with_capacity(2 * nnz);
    let mut off = 0;
    for entries in &cols {
        col_off.push(off);
        for &(j, _) in entries {
            col_data.push(j);
        }
        for &(_, l) in entries {
            col_data.push(l);
        }
        off += 2 * entries.len();
    }
    col_off.push(off);

    (row_off, row_vars, col_off, col_data, b_vals)
}

/// Build the flat tau index `[k(j)] ++ [K] ++ [offsets] ++ [J_k]` from the
/// per-potential assignment `k(j)` (precision-relative `j`).
pub fn build_tau_index(k_of_j: &[usize]) -> Vec<usize> {
    let m_prec = k_of_j.len();
    let num_k = k_of_j.iter().copied().max().map_or(0, |k| k + 1);
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); num_k];
    for (j, &k) in k_of_j.iter().enumerate() {
        groups[k].push(j);
    }
    let mut out = Vec::with_capacity(2 * m_prec + num_k + 2);
    out.extend_from_slice(k_of_j);
    out.push(num_k);
    let mut off = m_prec + num_k + 2;
    for g in &groups {
        out.push(off);
        off += g.len();
    }
    out.push(off);
    for g in &groups {
        out.extend_from_slice(g);
    }
    out
}
