#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use plugin_serve::bore::{self, TunnelProcess};
use plugin_serve::config::AnnouncePolicy;

// Writing a script while another test forks can make exec fail with ETXTBSY.
static SPAWN_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn write_script(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

fn spawn_fake_tunnel(dir: &Path, body: &str) -> TunnelProcess {
    let _guard = SPAWN_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
    let tunnel = dir.join("fake-bore");
    write_script(&tunnel, body);
    bore::spawn(&tunnel, 8000, "bore.pub").unwrap()
}

#[tokio::test]
async fn announcement_after_invalid_utf8_is_still_seen() {
    let temp = tempfile::tempdir().unwrap();
    let mut process = spawn_fake_tunnel(
        temp.path(),
        "printf 'bad \\377 byte\\n'\necho 'listening at bore.pub:4242'",
    );
    let mut out = Vec::new();
    let printed = bore::scan(
        &mut process.lines,
        "bore.pub",
        "wordle.wasm",
        AnnouncePolicy::Every,
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(printed, 1);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Plugin URL: http://bore.pub:4242/wordle.wasm\n"
    );
}

#[tokio::test]
async fn stderr_lines_are_merged_into_the_feed() {
    let temp = tempfile::tempdir().unwrap();
    let mut process = spawn_fake_tunnel(
        temp.path(),
        "echo 'connected to server'\necho 'listening at bore.pub:5151' >&2",
    );
    let mut out = Vec::new();
    let printed = bore::scan(
        &mut process.lines,
        "bore.pub",
        "wordle.wasm",
        AnnouncePolicy::Every,
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(printed, 1);
    assert!(String::from_utf8(out).unwrap().contains("bore.pub:5151/wordle.wasm"));
}
