//! Execution combinator
//!
//! Given a tool and the pools of candidate objects, compute the minimal set
//! of argument assignments (execution plans) covering every admissible
//! object at least once. Values bound to a `multiple` argument are batched
//! into one plan; values bound to a single-valued argument fan out into one
//! plan each. Findings are correlated through their parent links so a plan
//! never mixes unrelated chains (a vulnerability of technology A never
//! lands next to technology B).
//!
//! Plan index 0 is always the "primary" plan: when replanning for a job
//! already in flight, the primary plan is consumed by that job and only the
//! remaining plans spawn new executions.

use std::collections::HashSet;

use scanforge_core::domain::{BaseInput, Finding, InputPools, InputType, Tool};

/// One argument assignment for a tool invocation
pub type ExecutionPlan = InputPools;

/// Internal plan representation while branching: one vec per pool index.
type PoolVectors = [Vec<BaseInput>; InputPools::POOL_COUNT];

/// Compute the execution plans needed to cover every admissible base input.
pub fn calculate_executions(tool: &Tool, pools: &InputPools) -> Vec<ExecutionPlan> {
    let buckets = findings_by_type(&pools.findings);

    // Findings buckets first (all funnelled into pool index 0, since they
    // arrived from the same upstream job), then the parameter pools.
    let mut sources: Vec<(usize, Option<InputType>, Vec<BaseInput>)> = buckets
        .iter()
        .map(|(input_type, findings)| {
            (
                0,
                Some(*input_type),
                findings
                    .iter()
                    .cloned()
                    .map(BaseInput::Finding)
                    .collect::<Vec<_>>(),
            )
        })
        .collect();
    for index in 1..InputPools::POOL_COUNT {
        sources.push((index, None, pools.pool(index)));
    }

    let mut plans: Vec<PoolVectors> = vec![Default::default()];
    let mut used_types: HashSet<InputType> = HashSet::new();

    for (pool_index, declared_type, source) in sources {
        if source.is_empty() {
            continue;
        }
        let input_type = declared_type.unwrap_or_else(|| source[0].input_type());
        if declared_type.is_none() && used_types.contains(&input_type) {
            continue;
        }

        let bindings = tool.inputs_for(input_type);
        if bindings.is_empty() {
            continue;
        }

        // The argument that carries this pool's values is the one bound to
        // the first (lowest-order) input with at least one admissible match.
        let owning_argument = bindings.iter().find_map(|(argument, spec)| {
            source
                .iter()
                .any(|candidate| candidate.matches_filter(spec))
                .then_some(*argument)
        });
        let Some(owning_argument) = owning_argument else {
            continue;
        };
        let admissible: Vec<BaseInput> = source
            .iter()
            .filter(|candidate| {
                bindings
                    .iter()
                    .any(|(_, spec)| candidate.matches_filter(spec))
            })
            .cloned()
            .collect();

        let related_present: Vec<InputType> = input_type
            .related()
            .iter()
            .copied()
            .filter(|related| buckets.iter().any(|(bucket_type, _)| bucket_type == related))
            .collect();

        let snapshot = plans.clone();
        let mut any_placed = false;
        for (plan_index, original) in snapshot.iter().enumerate() {
            let mut selected = admissible.clone();
            if pool_index == 0 && !related_present.is_empty() {
                // Keep only findings whose related object was already chosen
                // for this exact plan under a related type.
                selected = correlate(&admissible, &related_present, &original[0]);
                if selected.is_empty() {
                    continue;
                }
            }
            any_placed = true;
            if owning_argument.multiple {
                plans[plan_index][pool_index].extend(selected);
            } else {
                plans[plan_index][pool_index].push(selected[0].clone());
                for extra in &selected[1..] {
                    let mut branch = original.clone();
                    branch[pool_index].push(extra.clone());
                    plans.push(branch);
                }
            }
        }
        if any_placed {
            used_types.insert(input_type);
        }
    }

    plans.into_iter().map(into_pools).collect()
}

/// Partition findings by input type, ordered by ascending number of related
/// input types so independent chains branch first.
fn findings_by_type(findings: &[Finding]) -> Vec<(InputType, Vec<Finding>)> {
    let mut buckets: Vec<(InputType, Vec<Finding>)> = Vec::new();
    for finding in findings {
        let input_type = finding.input_type();
        match buckets.iter_mut().find(|(existing, _)| *existing == input_type) {
            Some((_, bucket)) => bucket.push(finding.clone()),
            None => buckets.push((input_type, vec![finding.clone()])),
        }
    }
    buckets.sort_by_key(|(input_type, _)| input_type.related().len());
    buckets
}

/// Findings from `admissible` whose related object (under any of
/// `related_types`, in order) is already a member of the plan's findings
/// pool.
fn correlate(
    admissible: &[BaseInput],
    related_types: &[InputType],
    existing: &[BaseInput],
) -> Vec<BaseInput> {
    let mut selected: Vec<BaseInput> = Vec::new();
    for related_type in related_types {
        for candidate in admissible {
            let Some(related_id) = candidate.related_id(*related_type) else {
                continue;
            };
            let already_chosen = existing.iter().any(|member| member.id() == related_id);
            let duplicate = selected.iter().any(|member| member.id() == candidate.id());
            if already_chosen && !duplicate {
                selected.push(candidate.clone());
            }
        }
    }
    selected
}

fn into_pools(vectors: PoolVectors) -> InputPools {
    let mut pools = InputPools::default();
    for pool in vectors {
        for input in pool {
            pools.push(input);
        }
    }
    pools
}
