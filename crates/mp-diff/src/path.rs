//! Shortest downgrade path search over the version graph
//!
//! Real diff indexes are short chains with occasional fork/merge, so a
//! plain depth-first exploration is enough. The search is pure: no I/O,
//! no mutation, safe to call repeatedly and concurrently.

use mp_core::DiffEdge;

/// Find the fewest-hop sequence of diffs from `from` to `to`.
///
/// Returns the empty sequence when `from == to`, and `None` when no
/// route exists. Edges are explored in declaration order and a
/// candidate only replaces the current best on strictly fewer hops, so
/// among equally short routes the first-declared one wins. Versions
/// already on the current path are not revisited, which keeps cyclic
/// diff data from recursing forever.
pub fn find_shortest_path(edges: &[DiffEdge], from: &str, to: &str) -> Option<Vec<DiffEdge>> {
    let mut on_path = Vec::new();
    search(edges, from, to, &mut on_path)
}

fn search<'a>(
    edges: &'a [DiffEdge],
    from: &str,
    to: &str,
    on_path: &mut Vec<&'a str>,
) -> Option<Vec<DiffEdge>> {
    if from == to {
        return Some(Vec::new());
    }

    let mut best: Option<Vec<DiffEdge>> = None;

    for edge in edges.iter().filter(|e| e.from_version == from) {
        if on_path.iter().any(|v| *v == edge.to_version) {
            continue;
        }

        on_path.push(&edge.to_version);
        let continuation = search(edges, &edge.to_version, to, on_path);
        on_path.pop();

        if let Some(tail) = continuation {
            let mut candidate = Vec::with_capacity(tail.len() + 1);
            candidate.push(edge.clone());
            candidate.extend(tail);

            let shorter = best
                .as_ref()
                .map_or(true, |current| candidate.len() < current.len());
            if shorter {
                best = Some(candidate);
            }
        }
    }

    best
}
