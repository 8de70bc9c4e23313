//! Persistence and streaming across world restarts.

use strata_common::{ChunkCoord, WorldCoord};
use strata_world::{
    ChunkGenerator, FileChunkStore, GeneratorKind, Material, Offscreen, ViewRect, World,
    WorldConfig,
};

fn config(seed: u64) -> WorldConfig {
    WorldConfig {
        seed,
        generator: GeneratorKind::Noise,
        flat_fill: Material::Stone,
        ticks_per_second: 20,
    }
}

#[test]
fn test_generation_identical_across_restarts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let coords: Vec<_> = (-2..2)
        .flat_map(|x| (0..4).map(move |y| ChunkCoord::new(x, y)))
        .collect();

    let first: Vec<_> = {
        let mut world = World::with_save_dir(config(4242), dir.path());
        coords
            .iter()
            .map(|&c| world.load_chunk(c).slots().to_vec())
            .collect()
    };

    let mut world = World::with_save_dir(config(4242), dir.path());
    for (coord, slots) in coords.iter().zip(first) {
        assert_eq!(world.load_chunk(*coord).slots(), slots.as_slice());
    }
}

#[test]
fn test_edits_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = WorldCoord::new(-77, 500);

    {
        let mut world = World::with_save_dir(config(1), dir.path());
        world.set_block(target.x, target.y, Some(Material::Clay));
        assert_eq!(world.dispose().expect("dispose"), 1);
    }

    let store = FileChunkStore::new(dir.path());
    assert!(store.chunk_path(target.to_chunk_coord()).is_file());

    let mut world = World::with_save_dir(config(1), dir.path());
    world.load_chunk(target.to_chunk_coord());
    let block = world.get_block(target.x, target.y).expect("block persisted");
    assert_eq!(block.material, Material::Clay);
}

#[test]
fn test_unmodified_chunks_never_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut world = World::with_save_dir(config(2), dir.path());
    world.load_area(&ViewRect::around(ChunkCoord::new(0, 2), 2));

    for _ in 0..(20 * 5 + 1) {
        world.tick(&Offscreen);
    }
    assert_eq!(world.resident_count(), 0);
    assert_eq!(
        std::fs::read_dir(dir.path()).map(Iterator::count).unwrap_or(0),
        0
    );
}

#[test]
fn test_corrupt_file_falls_back_to_generation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let coord = ChunkCoord::new(3, 1);
    let store = FileChunkStore::new(dir.path());
    let path = store.chunk_path(coord);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, b"not a chunk").expect("write");

    let mut world = World::with_save_dir(config(99), dir.path());
    let expected = ChunkGenerator::with_seed(99).generate(coord);
    let chunk = world.load_chunk(coord);
    assert!(chunk.is_loaded());
    assert_eq!(chunk.slots(), expected.slots());
}
