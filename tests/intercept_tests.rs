mod common;

use common::{
    CountingTransformer, Fixture, LIB, LIB_DEP, MAIN, ORIGINAL, REWRITTEN, SAME_LEVEL, SAME_LEVEL_DEP, agent,
    user_agents,
};
use solvra_intercept::ast::Literal;
use solvra_intercept::modules::compute_fingerprint;
use solvra_intercept::{
    InterceptError, InterceptionPolicy, Interceptor, LiteralReplacer, ModuleError, ModuleLoader, NodeRewriter,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

#[test]
fn all_modules_policy_rewrites_every_load_once() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let transformer = CountingTransformer::new();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::AllModules,
        transformer.clone(),
    )
    .expect("valid policy");

    let agents = interceptor
        .run_scoped(|| user_agents(&loader, &fixture.path(MAIN)))
        .expect("scope runs");

    for (name, value) in &agents {
        assert_eq!(value, REWRITTEN, "{name} should be rewritten");
    }
    assert_eq!(transformer.calls(), 5);
}

#[test]
fn no_dependency_policy_skips_vendored_modules() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let transformer = CountingTransformer::new();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::NoDependencyModules,
        transformer.clone(),
    )
    .unwrap();

    let agents = interceptor
        .run_scoped(|| user_agents(&loader, &fixture.path(MAIN)))
        .unwrap();

    assert_eq!(agent(&agents, "userAgent"), REWRITTEN);
    assert_eq!(agent(&agents, "sameUa"), REWRITTEN);
    assert_eq!(agent(&agents, "sameDepUa"), REWRITTEN);
    assert_eq!(agent(&agents, "libUa"), ORIGINAL);
    assert_eq!(agent(&agents, "libDepUa"), ORIGINAL);
    assert_eq!(transformer.calls(), 3);
}

#[test]
fn top_level_policy_skips_dependencies_of_dependencies() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::TopLevelDependencyModulesOnly,
        CountingTransformer::new(),
    )
    .unwrap();

    let agents = interceptor
        .run_scoped(|| user_agents(&loader, &fixture.path(MAIN)))
        .unwrap();

    assert_eq!(agent(&agents, "userAgent"), REWRITTEN);
    assert_eq!(agent(&agents, "libUa"), REWRITTEN);
    assert_eq!(agent(&agents, "sameUa"), REWRITTEN);
    assert_eq!(agent(&agents, "sameDepUa"), REWRITTEN);
    assert_eq!(agent(&agents, "libDepUa"), ORIGINAL);
}

#[test]
fn top_level_policy_follows_the_requester_not_the_module() {
    let fixture = Fixture::new();
    fixture.write(
        "solvra_modules/wrapper.svs",
        "import lib from \"lib-7\";\nexport libUa = lib.userAgent;\n",
    );
    let wrapped = fixture.write(
        "wrapped.svs",
        "import w from \"wrapper\";\nexport libUa = w.libUa;\n",
    );
    let loader = fixture.loader();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::TopLevelDependencyModulesOnly,
        CountingTransformer::new(),
    )
    .unwrap();

    // lib-7 imported straight from first-party code.
    let direct = interceptor
        .run_scoped(|| user_agents(&loader, &fixture.path(MAIN)))
        .unwrap();
    assert_eq!(agent(&direct, "libUa"), REWRITTEN);
    assert!(loader.cache_keys().is_empty());

    // The same lib-7, this time imported by another vendored module.
    let through_wrapper = interceptor
        .run_scoped(|| loader.require_path(&wrapped))
        .unwrap()
        .expect("load wrapped module");
    assert_eq!(through_wrapper.export_str("libUa"), Some(ORIGINAL));
}

#[test]
fn explicit_path_set_only_rewrites_listed_paths() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        vec![fixture.path(LIB_DEP), fixture.path(SAME_LEVEL)],
        CountingTransformer::new(),
    )
    .unwrap();

    let agents = interceptor
        .run_scoped(|| user_agents(&loader, &fixture.path(MAIN)))
        .unwrap();

    assert_eq!(agent(&agents, "libDepUa"), REWRITTEN);
    assert_eq!(agent(&agents, "sameUa"), REWRITTEN);
    assert_eq!(agent(&agents, "userAgent"), ORIGINAL);
    assert_eq!(agent(&agents, "libUa"), ORIGINAL);
    assert_eq!(agent(&agents, "sameDepUa"), ORIGINAL);
}

#[test]
fn ineligible_modules_load_from_untouched_source() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let transformer = CountingTransformer::new();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::NoDependencyModules,
        transformer.clone(),
    )
    .unwrap();

    let module = interceptor
        .run_scoped(|| loader.require_path(&fixture.path(LIB)))
        .unwrap()
        .expect("load vendored module");

    assert_eq!(transformer.calls(), 0);
    assert_eq!(module.fingerprint, compute_fingerprint(&fixture.source(LIB)));
    assert_eq!(module.export_str("userAgent"), Some(ORIGINAL));
}

#[test]
fn scope_end_restores_stage_and_cache() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::AllModules,
        CountingTransformer::new(),
    )
    .unwrap();
    let stage_before = loader.pipeline().current().id();

    let inside = interceptor
        .run_scoped(|| {
            assert!(interceptor.is_active());
            user_agents(&loader, &fixture.path(MAIN))
        })
        .unwrap();
    assert_eq!(agent(&inside, "userAgent"), REWRITTEN);

    assert!(!interceptor.is_active());
    assert_eq!(loader.pipeline().current().id(), stage_before);
    assert!(loader.cache_keys().is_empty());

    let after = user_agents(&loader, &fixture.path(MAIN));
    for (name, value) in &after {
        assert_eq!(value, ORIGINAL, "{name} should load from original source");
    }
}

#[test]
fn entries_cached_before_construction_survive_and_are_reused() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let warm = loader
        .require_path(&fixture.path(SAME_LEVEL_DEP))
        .expect("warm cache");
    let transformer = CountingTransformer::new();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::AllModules,
        transformer.clone(),
    )
    .unwrap();

    let agents = interceptor
        .run_scoped(|| user_agents(&loader, &fixture.path(MAIN)))
        .unwrap();

    assert_eq!(agent(&agents, "sameDepUa"), ORIGINAL);
    assert_eq!(agent(&agents, "sameUa"), REWRITTEN);
    assert_eq!(transformer.calls(), 4);
    assert_eq!(
        loader.cache_keys().into_iter().collect::<Vec<_>>(),
        vec![warm.id.clone()]
    );
    let cached = loader.cached(&warm.id).expect("still cached");
    assert!(Arc::ptr_eq(&cached, &warm));
}

#[test]
fn invalid_rewrite_fails_only_that_load() {
    let fixture = Fixture::new();
    let bad = fixture.write("bad.svs", "export v = \"break-me\";\n");
    let good = fixture.write("good.svs", "export v = \"fine\";\n");
    let loader = fixture.loader();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::AllModules,
        LiteralReplacer::new(Literal::Str("break-me".into()), "invalid ~ script"),
    )
    .unwrap();

    let (bad_result, good_result) = interceptor
        .run_scoped(|| (loader.require_path(&bad), loader.require_path(&good)))
        .unwrap();

    let err = bad_result.expect_err("rewritten source does not parse");
    assert!(err.is_syntax_error());
    assert!(matches!(err, ModuleError::Transform { .. }));
    assert!(err.to_string().contains("bad.svs"));
    assert_eq!(good_result.expect("good module loads").export_str("v"), Some("fine"));

    let after = loader.require_path(&bad).expect("original source is valid");
    assert_eq!(after.export_str("v"), Some("break-me"));
}

#[test]
fn scenario_rewrites_x_to_y_only_inside_scope() {
    let fixture = Fixture::new();
    let module_path = fixture.write("m.svs", "export value = \"X\";\n");
    let loader = fixture.loader();
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        [module_path.clone()],
        NodeRewriter::new(|node| {
            if node.is_string_literal("X") {
                node.update("\"Y\"");
            }
        }),
    )
    .unwrap();

    let inside = interceptor
        .run_scoped(|| loader.require_path(&module_path))
        .unwrap()
        .unwrap();
    assert_eq!(inside.export_str("value"), Some("Y"));

    let outside = loader.require_path(&module_path).unwrap();
    assert_eq!(outside.export_str("value"), Some("X"));
}

#[test]
fn invalid_policies_fail_at_construction() {
    let fixture = Fixture::new();
    let loader = fixture.loader();

    let err = Interceptor::new(Arc::clone(&loader), 17i32, CountingTransformer::new())
        .expect_err("unknown code");
    assert!(matches!(err, InterceptError::InvalidPolicy(_)));

    let err = Interceptor::new(Arc::clone(&loader), "sometimes", CountingTransformer::new())
        .expect_err("unknown name");
    assert!(matches!(err, InterceptError::InvalidPolicy(_)));

    let ok = Interceptor::new(loader, 1u8, CountingTransformer::new()).expect("code 1 is valid");
    assert_eq!(ok.policy(), &InterceptionPolicy::NoDependencyModules);
}

#[test]
fn directory_policies_need_an_entry_directory() {
    let fixture = Fixture::new();
    let loader = Arc::new(ModuleLoader::without_entry_dir());
    let interceptor = Interceptor::new(
        Arc::clone(&loader),
        InterceptionPolicy::TopLevelDependencyModulesOnly,
        CountingTransformer::new(),
    )
    .expect("construction does not need the entry directory");

    let err = interceptor
        .run_scoped(|| loader.require_path(&fixture.path(SAME_LEVEL_DEP)))
        .unwrap()
        .expect_err("no entry directory");
    assert!(matches!(err, ModuleError::UnsupportedPlatform { .. }));

    let explicit = Interceptor::new(
        Arc::clone(&loader),
        [fixture.path(SAME_LEVEL_DEP)],
        CountingTransformer::new(),
    )
    .unwrap();
    let module = explicit
        .run_scoped(|| loader.require_path(&fixture.path(SAME_LEVEL_DEP)))
        .unwrap()
        .expect("explicit paths need no entry directory");
    assert_eq!(module.export_str("userAgent"), Some(REWRITTEN));
}

#[test]
fn second_interceptor_cannot_take_over() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let first = Interceptor::new(Arc::clone(&loader), "all", CountingTransformer::new()).unwrap();
    let second = Interceptor::new(Arc::clone(&loader), "all", CountingTransformer::new()).unwrap();

    let token = first.activate().expect("first activation");
    match second.activate() {
        Err(InterceptError::HookBusy { holder }) => assert_eq!(holder, first.id()),
        other => panic!("expected busy hook, got {other:?}"),
    }
    assert!(!second.deactivate());
    assert!(first.is_active());

    let late = Interceptor::new(Arc::clone(&loader), "all", CountingTransformer::new());
    assert!(matches!(late, Err(InterceptError::HookBusy { .. })));

    assert!(token.restore());
    let token = second.activate().expect("free after restore");
    assert!(token.restore());
}

#[test]
fn activation_is_idempotent_and_deactivation_is_safe() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let interceptor = Interceptor::new(Arc::clone(&loader), 3i64, CountingTransformer::new()).unwrap();

    assert!(!interceptor.deactivate());

    let first = interceptor.activate().unwrap();
    let again = interceptor.activate().unwrap();
    assert_eq!(first.stage_id(), again.stage_id());
    assert!(first.is_outermost());
    assert!(!again.is_outermost());

    let module = loader.require_path(&fixture.path(SAME_LEVEL_DEP)).unwrap();
    assert_eq!(module.export_str("userAgent"), Some(REWRITTEN));

    assert!(first.restore());
    assert!(!again.restore());
    assert!(loader.cache_keys().is_empty());
}

#[test]
fn interceptor_can_run_several_scopes() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let transformer = CountingTransformer::new();
    let interceptor = Interceptor::new(Arc::clone(&loader), "all", transformer.clone()).unwrap();

    for _ in 0..2 {
        let module = interceptor
            .run_scoped(|| loader.require_path(&fixture.path(SAME_LEVEL_DEP)))
            .unwrap()
            .unwrap();
        assert_eq!(module.export_str("userAgent"), Some(REWRITTEN));
    }
    assert_eq!(transformer.calls(), 2);
}

#[test]
fn panicking_work_still_restores() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let interceptor = Interceptor::new(Arc::clone(&loader), "all", CountingTransformer::new()).unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        interceptor.run_scoped(|| {
            loader.require_path(&fixture.path(MAIN)).expect("load main");
            panic!("work failed");
        })
    }));

    assert!(outcome.is_err());
    assert!(!interceptor.is_active());
    assert!(loader.cache_keys().is_empty());
    let module = loader.require_path(&fixture.path(SAME_LEVEL_DEP)).unwrap();
    assert_eq!(module.export_str("userAgent"), Some(ORIGINAL));
}

#[test]
fn work_errors_are_returned_unchanged() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let interceptor = Interceptor::new(Arc::clone(&loader), "all", CountingTransformer::new()).unwrap();

    let result: Result<(), &str> = interceptor.run_scoped(|| Err("boom")).unwrap();
    assert_eq!(result, Err("boom"));
    assert!(!interceptor.is_active());
}

#[test]
fn nested_scopes_keep_interception_until_the_outer_scope_ends() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let interceptor = Interceptor::new(Arc::clone(&loader), "all", CountingTransformer::new()).unwrap();
    let dep = fixture.path(SAME_LEVEL_DEP);

    let agents = interceptor
        .run_scoped(|| {
            let inner = interceptor
                .run_scoped(|| loader.require_path(&dep))
                .expect("re-entrant scope")
                .expect("load dependency");
            assert_eq!(inner.export_str("userAgent"), Some(REWRITTEN));

            assert!(interceptor.is_active());
            assert!(loader.cached(&inner.id).is_some());
            user_agents(&loader, &fixture.path(MAIN))
        })
        .unwrap();

    for (name, value) in &agents {
        assert_eq!(value, REWRITTEN, "{name} loaded after the inner scope ended");
    }
    assert!(!interceptor.is_active());
    assert!(loader.cache_keys().is_empty());
}

#[test]
fn stale_token_does_not_end_a_later_activation() {
    let fixture = Fixture::new();
    let loader = fixture.loader();
    let interceptor = Interceptor::new(Arc::clone(&loader), "all", CountingTransformer::new()).unwrap();
    let dep = fixture.path(SAME_LEVEL_DEP);

    let stale = interceptor.activate().unwrap();
    assert!(interceptor.deactivate());
    let current = interceptor.activate().unwrap();
    assert_ne!(stale.stage_id(), current.stage_id());

    assert!(!stale.restore());
    assert!(interceptor.is_active());
    let module = loader.require_path(&dep).unwrap();
    assert_eq!(module.export_str("userAgent"), Some(REWRITTEN));

    assert!(current.restore());
    assert!(!interceptor.is_active());
    assert!(loader.cache_keys().is_empty());
}
