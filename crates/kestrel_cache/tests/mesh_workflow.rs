//! Integration tests driving the store and cache the way a mesh type would.
//!
//! `Mesh` owns one `DataStore` and one `Cache`; derived properties go through
//! `get_or_compute`, and rigid transforms declare which results survive.

use std::cell::Cell;
use std::collections::BTreeSet;

use kestrel_cache::{Cache, CacheError, DataStore, HashStrategy, TrackedArray};

/// Entries that depend only on face connectivity.
const TOPOLOGY_KEYS: [&str; 1] = ["edges"];

struct Mesh {
    data: DataStore,
    cache: Cache,
    edge_builds: Cell<usize>,
    bounds_builds: Cell<usize>,
}

impl Mesh {
    fn new(vertices: &[[f64; 3]], faces: &[[i64; 3]], strategy: HashStrategy) -> Self {
        let mut data = DataStore::with_strategy(strategy);
        data.set("vertices", TrackedArray::from_rows(vertices)).unwrap();
        data.set("faces", TrackedArray::from_rows(faces)).unwrap();
        Self {
            data,
            cache: Cache::new(),
            edge_builds: Cell::new(0),
            bounds_builds: Cell::new(0),
        }
    }

    /// Parses whitespace-separated `v x y z` and `f a b c` lines.
    fn parse(text: &str) -> Self {
        let mut vertices: Vec<[f64; 3]> = Vec::new();
        let mut faces: Vec<[i64; 3]> = Vec::new();
        for line in text.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.first() {
                Some(&"v") => vertices.push([
                    parts[1].parse().unwrap(),
                    parts[2].parse().unwrap(),
                    parts[3].parse().unwrap(),
                ]),
                Some(&"f") => faces.push([
                    parts[1].parse().unwrap(),
                    parts[2].parse().unwrap(),
                    parts[3].parse().unwrap(),
                ]),
                _ => {}
            }
        }
        Self::new(&vertices, &faces, HashStrategy::Fast)
    }

    fn edges(&mut self) -> Vec<[i64; 2]> {
        let faces = self.data.get::<i64>("faces").unwrap();
        let builds = &self.edge_builds;
        self.cache
            .get_or_compute(&self.data, "edges", || {
                builds.set(builds.get() + 1);
                let mut edges = BTreeSet::new();
                for tri in faces.to_vec().chunks(3) {
                    for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                        edges.insert([a.min(b), a.max(b)]);
                    }
                }
                edges.into_iter().collect::<Vec<[i64; 2]>>()
            })
            .unwrap()
            .clone()
    }

    fn bounds(&mut self) -> [[f64; 3]; 2] {
        let vertices = self.data.get::<f64>("vertices").unwrap();
        let builds = &self.bounds_builds;
        *self
            .cache
            .get_or_compute(&self.data, "bounds", || {
                builds.set(builds.get() + 1);
                let mut lo = [f64::INFINITY; 3];
                let mut hi = [f64::NEG_INFINITY; 3];
                for row in vertices.to_vec().chunks(3) {
                    for axis in 0..3 {
                        lo[axis] = lo[axis].min(row[axis]);
                        hi[axis] = hi[axis].max(row[axis]);
                    }
                }
                [lo, hi]
            })
            .unwrap()
    }

    /// Applies a rotation about z followed by a translation.
    fn apply_rigid_transform(&mut self, angle: f64, offset: [f64; 3]) -> Result<(), CacheError> {
        let (sin, cos) = angle.sin_cos();
        self.cache
            .declare_mutation(&mut self.data, &TOPOLOGY_KEYS, |data| {
                data.modify::<f64, _>("vertices", |v| {
                    v.map_rows_inplace(|row| {
                        let (x, y) = (row[0], row[1]);
                        row[0] = cos * x - sin * y + offset[0];
                        row[1] = sin * x + cos * y + offset[1];
                        row[2] += offset[2];
                    })
                })
            })??;
        Ok(())
    }
}

fn tetrahedron(strategy: HashStrategy) -> Mesh {
    Mesh::new(
        &[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ],
        &[[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        strategy,
    )
}

const TETRA_TEXT: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
f 0 2 1
f 0 1 3
f 0 3 2
f 1 2 3
";

#[test]
fn derived_values_are_memoized() {
    let mut m = tetrahedron(HashStrategy::Fast);
    assert_eq!(m.edges().len(), 6);
    assert_eq!(m.edges().len(), 6);
    m.bounds();
    m.bounds();
    assert_eq!(m.edge_builds.get(), 1);
    assert_eq!(m.bounds_builds.get(), 1);
}

#[test]
fn rigid_transform_keeps_topology_entries() {
    for strategy in [HashStrategy::Fast, HashStrategy::Fallback, HashStrategy::Sha256] {
        let mut m = tetrahedron(strategy);
        let edges = m.edges();
        let before = m.bounds();

        m.apply_rigid_transform(std::f64::consts::FRAC_PI_2, [10.0, 0.0, 0.0])
            .unwrap();

        assert_eq!(m.edges(), edges);
        assert_eq!(m.edge_builds.get(), 1, "edges survive a rigid transform");

        let after = m.bounds();
        assert_eq!(m.bounds_builds.get(), 2, "bounds are recomputed");
        assert_ne!(before, after);
        assert!((after[0][0] - 9.0).abs() < 1e-9);
    }
}

#[test]
fn undeclared_vertex_edit_drops_everything() {
    let mut m = tetrahedron(HashStrategy::Fast);
    m.edges();
    m.data
        .modify::<f64, _>("vertices", |v| *v += &[1.0, 0.0, 0.0][..])
        .unwrap();
    m.edges();
    assert_eq!(m.edge_builds.get(), 2);
}

#[test]
fn adding_zero_to_faces_keeps_cache() {
    let mut m = tetrahedron(HashStrategy::Fast);
    let initial = m.data.composite_fingerprint();
    m.edges();

    m.data.modify::<i64, _>("faces", |f| *f += 0).unwrap();
    assert_eq!(m.data.composite_fingerprint(), initial);
    m.edges();
    assert_eq!(m.edge_builds.get(), 1);

    m.data
        .modify::<f64, _>("vertices", |v| v.map_rows_inplace(|row| row[0] += 1.0))
        .unwrap()
        .unwrap();
    assert_ne!(m.data.composite_fingerprint(), initial);
}

#[test]
fn immutable_mesh_rejects_edits_but_serves_cache() {
    let mut m = tetrahedron(HashStrategy::Fast);
    m.edges();
    m.data.set_mutable(false);

    let err = m.apply_rigid_transform(0.3, [0.0; 3]).unwrap_err();
    assert!(matches!(err, CacheError::ImmutableData { .. }));

    m.edges();
    m.bounds();
    assert_eq!(m.edge_builds.get(), 1);
}

#[test]
fn separately_loaded_meshes_share_fingerprints() {
    let a = Mesh::parse(TETRA_TEXT);
    let b = Mesh::parse(TETRA_TEXT);
    assert_eq!(a.data.composite_fingerprint(), b.data.composite_fingerprint());
    assert_eq!(a.data.content_digest(), b.data.content_digest());
    assert_eq!(
        a.data.composite_fingerprint().to_u64(),
        tetrahedron(HashStrategy::Fast).data.composite_fingerprint().to_u64()
    );
}

#[test]
fn fingerprints_work_as_map_keys() {
    use std::collections::HashMap;

    let meshes = [
        Mesh::parse(TETRA_TEXT),
        Mesh::parse(TETRA_TEXT),
        Mesh::new(&[[0.0; 3]], &[[0, 0, 0]], HashStrategy::Fast),
    ];
    let mut unique: HashMap<_, usize> = HashMap::new();
    for (i, m) in meshes.iter().enumerate() {
        unique.entry(m.data.content_digest()).or_insert(i);
    }
    assert_eq!(unique.len(), 2);
}
