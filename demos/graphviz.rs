//! Prints a random tree as a Graphviz digraph.
//!
//! Pipe the output through `dot -Tsvg` to look at the tree shape and the
//! per-node balance factors.

use std::io;

use rand::{rngs::StdRng, Rng, SeedableRng};

use avlmap::AvlTreeMap;

fn main() -> io::Result<()> {
    let mut rng = StdRng::seed_from_u64(0);
    let mut map = AvlTreeMap::new();
    for _ in 0..20 {
        map.insert(rng.gen_range(0..1_000u32), ());
    }

    map.write_dot(&mut io::stdout().lock())
}
