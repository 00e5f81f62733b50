use std::path::Path;

use plugin_serve::artifact::{DiscoveryOptions, discover, discover_all};

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "\0asm").unwrap();
}

fn options(root: &Path) -> DiscoveryOptions {
    DiscoveryOptions {
        root: root.to_path_buf(),
        extension: "wasm".to_string(),
        max_depth: 3,
    }
}

#[test]
fn finds_single_artifact() {
    let temp = tempfile::tempdir().unwrap();
    let target = temp.path().join("target");
    let wasm = target
        .join("wasm32-wasip1")
        .join("release")
        .join("wordle.wasm");
    touch(&wasm);
    touch(&target.join("wasm32-wasip1").join("release").join("wordle.d"));

    let artifact = discover(&options(&target)).unwrap().unwrap();
    assert_eq!(artifact.path, wasm);
    assert_eq!(artifact.name, "wordle.wasm");
    assert_eq!(artifact.dir, wasm.parent().unwrap());
}

#[test]
fn no_match_yields_none() {
    let temp = tempfile::tempdir().unwrap();
    let target = temp.path().join("target");
    touch(&target.join("debug").join("plugin.rlib"));

    assert!(discover(&options(&target)).unwrap().is_none());
}

#[test]
fn missing_root_yields_none() {
    let temp = tempfile::tempdir().unwrap();
    assert!(discover(&options(&temp.path().join("target"))).unwrap().is_none());
}

#[test]
fn depth_limit_skips_deeper_files() {
    let temp = tempfile::tempdir().unwrap();
    let target = temp.path().join("target");
    touch(
        &target
            .join("wasm32-wasip1")
            .join("release")
            .join("deps")
            .join("wordle-1234.wasm"),
    );

    assert!(discover(&options(&target)).unwrap().is_none());

    let deeper = DiscoveryOptions {
        max_depth: 4,
        ..options(&target)
    };
    assert_eq!(discover_all(&deeper).unwrap().len(), 1);
}

#[test]
fn multiple_matches_are_sorted() {
    let temp = tempfile::tempdir().unwrap();
    let target = temp.path().join("target");
    let b = target.join("release").join("b.wasm");
    let a = target.join("debug").join("a.wasm");
    touch(&b);
    touch(&a);

    let all = discover_all(&options(&target)).unwrap();
    assert_eq!(all, vec![a.clone(), b]);
    assert_eq!(discover(&options(&target)).unwrap().unwrap().path, a);
}
