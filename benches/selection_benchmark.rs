use club_portal::models::{
    CalendarScope, Context, ContextType, Relation, RoleDescriptor, RolePermissions,
};
use club_portal::services::{permissions, select_active_context, ContextState};
use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use std::hint::black_box;

/// A busy account: a coach of many groups with several children enrolled.
fn contexts(n: usize) -> Vec<Context> {
    (0..n)
        .map(|i| {
            let coach = i % 3 == 0;
            let mut flags = BTreeMap::new();
            flags.insert("can_view_calendar".to_string(), serde_json::json!(true));
            flags.insert("can_take_attendance".to_string(), serde_json::json!(coach));

            Context {
                context_type: if coach {
                    ContextType::Coach
                } else {
                    ContextType::Dependent
                },
                profile_id: format!("p{}", i),
                profile_name: format!("Profile {}", i),
                subscription_id: (!coach).then(|| format!("S{}", i)),
                group_id: format!("G{}", i),
                group_name: format!("Group {}", i),
                relation: if coach { Relation::Own } else { Relation::Parent },
                staff_role: coach.then(|| "assistant_coach".to_string()),
                roles: vec![RoleDescriptor {
                    role_name: "member".to_string(),
                    display_name: "Member".to_string(),
                    permissions: RolePermissions {
                        calendar_scope: Some(CalendarScope::AssignedGroups),
                        flags,
                    },
                }],
            }
        })
        .collect()
}

fn benchmark_selection(c: &mut Criterion) {
    let list = contexts(60);
    let last_key = list[59].identity_key().0;

    let mut group = c.benchmark_group("select_active_context");

    group.bench_function("persisted_key_last", |b| {
        b.iter(|| select_active_context(black_box(&list), black_box(Some(last_key.as_str()))))
    });

    group.bench_function("stale_key_falls_back", |b| {
        b.iter(|| select_active_context(black_box(&list), black_box(Some("S-gone"))))
    });

    group.finish();
}

fn benchmark_permissions(c: &mut Criterion) {
    let list = contexts(60);
    let state = ContextState {
        active_context: Some(list[0].clone()),
        contexts: list,
        ..ContextState::default()
    };

    c.bench_function("has_permission", |b| {
        b.iter(|| permissions::has_permission(black_box(&state), "can_take_attendance"))
    });

    c.bench_function("children_contexts", |b| {
        b.iter(|| permissions::children_contexts(black_box(&state)))
    });
}

criterion_group!(benches, benchmark_selection, benchmark_permissions);
criterion_main!(benches);
