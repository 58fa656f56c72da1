use super::{label, output, FakeBuild};
use qsync_build::{ArtifactKind, OutputInfo};
use qsync_cache::{CacheError, CacheKey, CopyPool, DependencyCache};
use std::collections::BTreeSet;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[test]
fn repeated_update_is_idempotent() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let guava = build.artifact("third_party/libguava.jar", "guava", "g1");
    let proto = build.artifact("proto/gen-src.jar", "proto", "p1");
    let info = output(&[
        ("//third_party:guava", ArtifactKind::Jar, &guava),
        ("//proto:gen", ArtifactKind::GenSrc, &proto),
    ]);
    let targets = BTreeSet::from([label("//third_party:guava"), label("//proto:gen")]);

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::new(4));
    let first = cache
        .update(&targets, &info, &CancellationToken::new())
        .unwrap();
    assert_eq!(first.updated_files.len(), 2);
    assert!(first.removed_keys.is_empty());
    let cached = cache.get_cached_targets();

    let second = cache
        .update(&targets, &info, &CancellationToken::new())
        .unwrap();
    assert!(second.is_empty(), "{second:?}");
    assert_eq!(cache.get_cached_targets(), cached);

    let jar = cache.cached_path(&guava).unwrap();
    assert!(jar.starts_with(cache_dir.path().join("jars")));
    let src = cache.cached_path(&proto).unwrap();
    assert!(src.starts_with(cache_dir.path().join("gensrc")));
}

#[test]
fn same_file_names_in_different_packages_do_not_collide() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let a = build.artifact("java/a/lib.jar", "from a", "d");
    let b = build.artifact("java/b/lib.jar", "from b", "d");
    let info = output(&[
        ("//java/a:lib", ArtifactKind::Jar, &a),
        ("//java/b:lib", ArtifactKind::Jar, &b),
    ]);

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    cache
        .update(
            &BTreeSet::from([label("//java/a:lib"), label("//java/b:lib")]),
            &info,
            &CancellationToken::new(),
        )
        .unwrap();

    assert_ne!(CacheKey::for_artifact(&a), CacheKey::for_artifact(&b));
    let a_path = cache.cached_path(&a).unwrap();
    let b_path = cache.cached_path(&b).unwrap();
    assert_eq!(std::fs::read_to_string(a_path).unwrap(), "from a");
    assert_eq!(std::fs::read_to_string(b_path).unwrap(), "from b");
}

#[test]
fn target_that_stops_producing_output_loses_its_files() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let a = build.artifact("a/liba.jar", "a", "d");
    let b = build.artifact("b/libb.jar", "b", "d");
    let targets = BTreeSet::from([label("//a:a"), label("//b:b")]);

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    cache
        .update(
            &targets,
            &output(&[
                ("//a:a", ArtifactKind::Jar, &a),
                ("//b:b", ArtifactKind::Jar, &b),
            ]),
            &CancellationToken::new(),
        )
        .unwrap();
    let b_path = cache.cached_path(&b).unwrap();

    let result = cache
        .update(
            &targets,
            &output(&[("//a:a", ArtifactKind::Jar, &a)]),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(
        result.removed_keys,
        BTreeSet::from([CacheKey::for_artifact(&b)])
    );
    assert!(!b_path.exists());
    assert_eq!(cache.get_cached_targets(), BTreeSet::from([label("//a:a")]));
}

#[test]
fn removal_reports_only_files_deleted_from_disk() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let a = build.artifact("a/liba.jar", "a", "d");
    let b = build.artifact("b/libb.jar", "b", "d");
    let c = build.artifact("c/libc.jar", "c", "d");
    let targets = BTreeSet::from([label("//a:a"), label("//b:b"), label("//c:c")]);

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    cache
        .update(
            &targets,
            &output(&[
                ("//a:a", ArtifactKind::Jar, &a),
                ("//b:b", ArtifactKind::Jar, &b),
                ("//c:c", ArtifactKind::Jar, &c),
            ]),
            &CancellationToken::new(),
        )
        .unwrap();
    // Deleted behind the cache's back: nothing is left to remove for //b:b.
    std::fs::remove_file(cache.cached_path(&b).unwrap()).unwrap();

    let result = cache
        .update(
            &targets,
            &output(&[("//a:a", ArtifactKind::Jar, &a)]),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(
        result.removed_keys,
        BTreeSet::from([CacheKey::for_artifact(&c)])
    );
    assert!(result.updated_files.is_empty(), "{result:?}");
    assert_eq!(cache.get_cached_targets(), BTreeSet::from([label("//a:a")]));
}

#[test]
fn missing_cached_file_is_copied_again() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let a = build.artifact("a/liba.jar", "a", "d");
    let targets = BTreeSet::from([label("//a:a")]);
    let info = output(&[("//a:a", ArtifactKind::Jar, &a)]);

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    cache.update(&targets, &info, &CancellationToken::new()).unwrap();
    let path = cache.cached_path(&a).unwrap();
    std::fs::remove_file(&path).unwrap();

    let result = cache.update(&targets, &info, &CancellationToken::new()).unwrap();
    assert_eq!(result.updated_files, BTreeSet::from([path.clone()]));
    assert!(path.exists());
}

#[test]
fn targets_outside_the_request_are_untouched() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let a = build.artifact("a/liba.jar", "a", "d");
    let b = build.artifact("b/libb.jar", "b", "d");

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    cache
        .update(
            &BTreeSet::from([label("//a:a")]),
            &output(&[("//a:a", ArtifactKind::Jar, &a)]),
            &CancellationToken::new(),
        )
        .unwrap();
    cache
        .update(
            &BTreeSet::from([label("//b:b")]),
            &output(&[("//b:b", ArtifactKind::Jar, &b)]),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(
        cache.get_cached_targets(),
        BTreeSet::from([label("//a:a"), label("//b:b")])
    );
    assert!(cache.cached_path(&a).is_some());
}

#[test]
fn cancelled_update_keeps_previous_targets() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let a = build.artifact("a/liba.jar", "a", "d");
    let b = build.artifact("b/libb.jar", "b", "d");

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    cache
        .update(
            &BTreeSet::from([label("//a:a")]),
            &output(&[("//a:a", ArtifactKind::Jar, &a)]),
            &CancellationToken::new(),
        )
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = cache
        .update(
            &BTreeSet::from([label("//a:a"), label("//b:b")]),
            &output(&[("//b:b", ArtifactKind::Jar, &b)]),
            &cancel,
        )
        .unwrap_err();
    assert!(matches!(err, CacheError::Cancelled), "{err}");
    assert_eq!(cache.get_cached_targets(), BTreeSet::from([label("//a:a")]));
    assert!(cache.cached_path(&a).is_some());
}

#[test]
fn state_persists_and_clear_removes_everything() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let a = build.artifact("a/liba.jar", "a", "d");
    let render = build.artifact("app/app_render.jar", "render", "r");

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    cache
        .update(
            &BTreeSet::from([label("//a:a")]),
            &output(&[("//a:a", ArtifactKind::Jar, &a)]),
            &CancellationToken::new(),
        )
        .unwrap();
    let rendered = cache
        .update_render_jars(&[render.clone()], &CancellationToken::new())
        .unwrap();
    assert_eq!(rendered.updated_files.len(), 1);
    cache.save_state().unwrap();

    let mut reopened = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    assert_eq!(reopened.get_cached_targets(), BTreeSet::from([label("//a:a")]));
    assert!(reopened
        .get_cached_artifact(&CacheKey::for_artifact(&render))
        .is_some());

    reopened.clear().unwrap();
    assert!(reopened.get_cached_targets().is_empty());
    assert!(reopened.cached_path(&a).is_none());
    let after = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    assert!(after.get_cached_targets().is_empty());
}

#[test]
fn empty_output_drops_requested_targets() {
    let build_dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let build = FakeBuild::new(build_dir.path());
    let a = build.artifact("a/liba.jar", "a", "d");

    let mut cache = DependencyCache::open(cache_dir.path(), CopyPool::inline());
    let targets = BTreeSet::from([label("//a:a")]);
    cache
        .update(
            &targets,
            &output(&[("//a:a", ArtifactKind::Jar, &a)]),
            &CancellationToken::new(),
        )
        .unwrap();
    let result = cache
        .update(&targets, &OutputInfo::default(), &CancellationToken::new())
        .unwrap();
    assert_eq!(result.removed_keys.len(), 1);
    assert!(cache.get_cached_targets().is_empty());
}
