//! Revision graph
//!
//! An in-memory view over every loaded revision script: parent/child links,
//! branch labels, dependency edges, reference resolution, ordered walks, and
//! the planning routines that turn an upgrade/downgrade/stamp target plus
//! the currently applied heads into an ordered list of migration steps. The
//! planner precomputes all version-table bookkeeping so step execution needs
//! no graph access.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{StratumError, StratumResult};
use crate::runtime::MigrationStep;

use super::revision::Revision;

/// All known revisions, linked into a graph
#[derive(Debug, Default)]
pub struct RevisionMap {
    revisions: BTreeMap<String, Arc<Revision>>,
}

impl RevisionMap {
    /// Link parsed revisions into a graph. Fails on duplicate ids, unknown
    /// parents, or unknown dependency targets.
    pub fn build(revisions: Vec<Revision>) -> StratumResult<Self> {
        let mut by_id: BTreeMap<String, Revision> = BTreeMap::new();

        for rev in revisions {
            if let Some(existing) = by_id.get(&rev.revision) {
                return Err(StratumError::directory(format!(
                    "duplicate revision id '{}' in {} and {}",
                    rev.revision,
                    existing.path.display(),
                    rev.path.display()
                )));
            }

            by_id.insert(rev.revision.clone(), rev);
        }

        let ids: Vec<String> = by_id.keys().cloned().collect();
        let mut children: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for id in &ids {
            let rev = &by_id[id];

            for parent in rev.down_revisions.clone() {
                if !by_id.contains_key(&parent) {
                    return Err(StratumError::resolution(
                        parent.clone(),
                        format!("parent of revision '{}' is not a known revision", id),
                    ));
                }

                children.entry(parent).or_default().insert(id.clone());
            }

            for dep in &rev.depends_on {
                if !by_id.contains_key(dep) {
                    return Err(StratumError::resolution(
                        dep.clone(),
                        format!("dependency of revision '{}' is not a known revision", id),
                    ));
                }
            }
        }

        for (parent, kids) in children {
            by_id.get_mut(&parent).unwrap().nextrev = kids;
        }

        Ok(Self {
            revisions: by_id.into_iter().map(|(id, rev)| (id, Arc::new(rev))).collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Look up a revision by exact id
    pub fn get_exact(&self, id: &str) -> StratumResult<Arc<Revision>> {
        self.revisions.get(id).cloned().ok_or_else(|| {
            StratumError::resolution(id, "not a known revision id")
        })
    }

    /// Look up a revision by exact id or unique prefix
    pub fn resolve_id(&self, token: &str) -> StratumResult<Option<Arc<Revision>>> {
        if let Some(rev) = self.revisions.get(token) {
            return Ok(Some(rev.clone()));
        }

        let matches: Vec<_> = self
            .revisions
            .iter()
            .filter(|(id, _)| id.starts_with(token))
            .map(|(_, rev)| rev.clone())
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.into_iter().next().unwrap())),
            _ => Err(StratumError::resolution(
                token,
                "prefix matches more than one revision",
            )),
        }
    }

    /// Revisions with no child revision
    pub fn heads(&self) -> Vec<Arc<Revision>> {
        self.revisions
            .values()
            .filter(|rev| rev.is_head())
            .cloned()
            .collect()
    }

    /// Heads with dependency edges treated as down-revision edges: a strict
    /// head that some other revision depends on is not an effective head.
    pub fn effective_heads(&self) -> Vec<Arc<Revision>> {
        let depended: BTreeSet<&str> = self
            .revisions
            .values()
            .flat_map(|rev| rev.depends_on.iter().map(|s| s.as_str()))
            .collect();

        self.heads()
            .into_iter()
            .filter(|rev| !depended.contains(rev.revision.as_str()))
            .collect()
    }

    /// Revisions with no parent
    pub fn bases(&self) -> Vec<Arc<Revision>> {
        self.revisions
            .values()
            .filter(|rev| rev.is_base())
            .cloned()
            .collect()
    }

    /// Every revision with more than one child
    pub fn branch_points(&self) -> Vec<Arc<Revision>> {
        self.revisions
            .values()
            .filter(|rev| rev.is_branch_point())
            .cloned()
            .collect()
    }

    /// Every member of an independent branch: the revisions carrying the
    /// label plus all of their descendants. Unknown labels are a resolution
    /// error, which the revision-creation bootstrap treats as "branch does
    /// not exist yet".
    pub fn branch_revisions(&self, branch: &str) -> StratumResult<Vec<Arc<Revision>>> {
        let roots: Vec<_> = self
            .revisions
            .values()
            .filter(|rev| rev.branch_labels.contains(branch))
            .cloned()
            .collect();

        if roots.is_empty() {
            return Err(StratumError::resolution(
                branch,
                "not a known branch label",
            ));
        }

        let mut members = BTreeSet::new();
        let mut stack: Vec<String> = roots.iter().map(|r| r.revision.clone()).collect();

        while let Some(id) = stack.pop() {
            if !members.insert(id.clone()) {
                continue;
            }

            for child in self.revisions[&id].nextrev.iter() {
                stack.push(child.clone());
            }
        }

        Ok(members
            .into_iter()
            .map(|id| self.revisions[&id].clone())
            .collect())
    }

    /// Resolve one symbolic reference to a set of revisions.
    ///
    /// Accepted forms: `"base"` (empty set), `"heads"`, `"head"` (must be
    /// unambiguous), `"{branch}@head"`, `"{branch}@base"`, a bare branch
    /// label (that branch's heads), a revision id, or a unique id prefix.
    pub fn get_revisions(&self, reference: &str) -> StratumResult<Vec<Arc<Revision>>> {
        match reference {
            "base" => Ok(Vec::new()),
            "heads" => Ok(self.effective_heads()),
            "head" => {
                let heads = self.effective_heads();

                if heads.len() > 1 {
                    let ids: Vec<_> = heads.iter().map(|r| r.revision.clone()).collect();
                    return Err(StratumError::resolution(
                        reference,
                        format!(
                            "multiple heads are present ({}); specify a branch or merge first",
                            ids.join(", ")
                        ),
                    ));
                }

                Ok(heads)
            }
            _ => {
                if let Some((branch, symbol)) = reference.split_once('@') {
                    let members = self.branch_revisions(branch)?;

                    return match symbol {
                        "head" => Ok(members.into_iter().filter(|r| r.is_head()).collect()),
                        "base" => Ok(members
                            .into_iter()
                            .filter(|r| r.branch_labels.contains(branch))
                            .collect()),
                        _ => Err(StratumError::resolution(
                            reference,
                            "expected '{branch}@head' or '{branch}@base'",
                        )),
                    };
                }

                if let Some(rev) = self.resolve_id(reference)? {
                    return Ok(vec![rev]);
                }

                let members = self.branch_revisions(reference)?;
                Ok(members.into_iter().filter(|r| r.is_head()).collect())
            }
        }
    }

    /// All revisions reachable from `ids` through parent (and optionally
    /// dependency) edges, including `ids` themselves.
    pub fn ancestors(&self, ids: &[String], include_deps: bool) -> StratumResult<BTreeSet<String>> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = ids.to_vec();

        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }

            let rev = self.get_exact(&id)?;

            for parent in &rev.down_revisions {
                stack.push(parent.clone());
            }

            if include_deps {
                for dep in &rev.depends_on {
                    stack.push(dep.clone());
                }
            }
        }

        Ok(seen)
    }

    /// Whether `ancestor` is `descendant` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.ancestors(&[descendant.to_string()], false)
            .map(|set| set.contains(ancestor))
            .unwrap_or(false)
    }

    /// Every revision ordered parents-and-dependencies-first. Ties break by
    /// id, so timestamp ids order chronologically.
    pub fn topo_order(&self) -> StratumResult<Vec<Arc<Revision>>> {
        let mut indegree: BTreeMap<String, usize> = self
            .revisions
            .keys()
            .map(|id| (id.clone(), 0))
            .collect();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for rev in self.revisions.values() {
            for edge in rev.down_revisions.iter().chain(rev.depends_on.iter()) {
                *indegree.get_mut(&rev.revision).unwrap() += 1;
                dependents
                    .entry(edge.clone())
                    .or_default()
                    .push(rev.revision.clone());
            }
        }

        let mut ready: BTreeSet<String> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut order = Vec::with_capacity(self.revisions.len());

        while let Some(id) = ready.iter().next().cloned() {
            ready.remove(&id);
            order.push(self.revisions[&id].clone());

            for next in dependents.get(&id).into_iter().flatten() {
                let d = indegree.get_mut(next).unwrap();
                *d -= 1;

                if *d == 0 {
                    ready.insert(next.clone());
                }
            }
        }

        if order.len() != self.revisions.len() {
            return Err(StratumError::directory(
                "revision graph contains a cycle",
            ));
        }

        Ok(order)
    }

    /// Revisions between two sets of bounds, newest first. The lower bound
    /// is inclusive; `"base"` (the empty set) means the whole history below
    /// the upper bound.
    pub fn walk(&self, lower: &[String], upper: &[String]) -> StratumResult<Vec<Arc<Revision>>> {
        let mut upper_ids = Vec::new();

        for reference in upper {
            for rev in self.get_revisions(reference)? {
                upper_ids.push(rev.revision.clone());
            }
        }

        let mut lower_ids = Vec::new();

        for reference in lower {
            for rev in self.get_revisions(reference)? {
                lower_ids.push(rev.revision.clone());
            }
        }

        let included = self.ancestors(&upper_ids, false)?;
        let mut excluded = self.ancestors(&lower_ids, false)?;

        // The lower bound itself stays in the walk.
        for id in &lower_ids {
            excluded.remove(id);
        }

        let order = self.topo_order()?;

        Ok(order
            .into_iter()
            .rev()
            .filter(|rev| included.contains(&rev.revision) && !excluded.contains(&rev.revision))
            .collect())
    }

    /// Plan the steps taking `applied` up to `targets`
    pub fn upgrade_steps(
        &self,
        targets: &[String],
        applied: &[String],
    ) -> StratumResult<Vec<MigrationStep>> {
        let mut target_ids = Vec::new();

        for target in targets {
            match parse_relative(target) {
                Some(n) if n > 0 => {
                    target_ids.push(self.walk_forward(applied, n as usize)?);
                }
                Some(_) => {
                    return Err(StratumError::resolution(
                        target,
                        "upgrade offsets must be positive",
                    ));
                }
                None => {
                    if target == "base" {
                        return Err(StratumError::resolution(target, "cannot upgrade to base"));
                    }

                    for rev in self.get_revisions(target)? {
                        target_ids.push(rev.revision.clone());
                    }
                }
            }
        }

        let wanted = self.ancestors(&target_ids, true)?;
        let already = self.ancestors(applied, true)?;
        let order = self.topo_order()?;

        let mut sim: Vec<String> = applied.to_vec();
        let mut steps = Vec::new();

        for rev in order {
            if !wanted.contains(&rev.revision) || already.contains(&rev.revision) {
                continue;
            }

            let replaces: Vec<String> = rev
                .down_revisions
                .iter()
                .filter(|p| sim.contains(*p))
                .cloned()
                .collect();
            sim.retain(|h| !replaces.contains(h));
            sim.push(rev.revision.clone());

            steps.push(MigrationStep::Upgrade {
                revision: rev,
                replaces,
            });
        }

        Ok(steps)
    }

    /// Plan the steps taking `applied` down to `target`. A positive count in
    /// relative form has already been normalized to negative by the caller's
    /// policy; a stray positive offset is an error here.
    pub fn downgrade_steps(
        &self,
        target: &str,
        applied: &[String],
    ) -> StratumResult<Vec<MigrationStep>> {
        if applied.is_empty() {
            return Ok(Vec::new());
        }

        let to_down: Vec<Arc<Revision>> = match parse_relative(target) {
            Some(n) if n < 0 => self.walk_backward(applied, (-n) as usize)?,
            Some(_) => {
                return Err(StratumError::resolution(
                    target,
                    "downgrade offsets must be negative",
                ));
            }
            None => {
                let applied_anc = self.ancestors(applied, false)?;

                let keep = if target == "base" {
                    BTreeSet::new()
                } else {
                    let revs = self.get_revisions(target)?;

                    if revs.len() != 1 {
                        return Err(StratumError::resolution(
                            target,
                            "downgrade requires a single target revision",
                        ));
                    }

                    let target_id = revs[0].revision.clone();

                    if !applied_anc.contains(&target_id) {
                        return Err(StratumError::resolution(
                            target,
                            "target is not an ancestor of the current revision",
                        ));
                    }

                    self.ancestors(&[target_id], false)?
                };

                let order = self.topo_order()?;
                order
                    .into_iter()
                    .rev()
                    .filter(|rev| {
                        applied_anc.contains(&rev.revision) && !keep.contains(&rev.revision)
                    })
                    .collect()
            }
        };

        let pending: BTreeSet<&str> = to_down.iter().map(|r| r.revision.as_str()).collect();
        let mut sim: Vec<String> = applied.to_vec();
        let mut steps = Vec::new();

        for rev in &to_down {
            sim.retain(|h| h != &rev.revision);

            let mut restores = Vec::new();

            for parent in &rev.down_revisions {
                if pending.contains(parent.as_str()) || sim.contains(parent) {
                    continue;
                }

                if sim.iter().any(|h| self.is_ancestor(parent, h)) {
                    continue;
                }

                restores.push(parent.clone());
            }

            sim.extend(restores.iter().cloned());

            steps.push(MigrationStep::Downgrade {
                revision: rev.clone(),
                restores,
            });
        }

        Ok(steps)
    }

    /// Plan a pure version-table move from `applied` to `targets`
    pub fn stamp_steps(
        &self,
        targets: &[String],
        applied: &[String],
    ) -> StratumResult<Vec<MigrationStep>> {
        let mut add = BTreeSet::new();

        for target in targets {
            if parse_relative(target).is_some() {
                return Err(StratumError::resolution(
                    target,
                    "relative references cannot be stamped",
                ));
            }

            for rev in self.get_revisions(target)? {
                add.insert(rev.revision.clone());
            }
        }

        let current: BTreeSet<String> = applied.iter().cloned().collect();

        if add == current {
            return Ok(Vec::new());
        }

        Ok(vec![MigrationStep::Stamp {
            remove: current.difference(&add).cloned().collect(),
            add: add.difference(&current).cloned().collect(),
        }])
    }

    fn walk_forward(&self, applied: &[String], n: usize) -> StratumResult<String> {
        let mut current = self.single_applied(applied, "+")?;

        for _ in 0..n {
            let next: Vec<String> = match &current {
                Some(id) => self.get_exact(id)?.nextrev.iter().cloned().collect(),
                None => self.bases().iter().map(|r| r.revision.clone()).collect(),
            };

            if next.len() != 1 {
                return Err(StratumError::resolution(
                    format!("+{n}"),
                    "relative upgrade is ambiguous or ran past a head",
                ));
            }

            current = Some(next.into_iter().next().unwrap());
        }

        current.ok_or_else(|| {
            StratumError::resolution(format!("+{n}"), "no revision at that offset")
        })
    }

    fn walk_backward(&self, applied: &[String], n: usize) -> StratumResult<Vec<Arc<Revision>>> {
        let mut current = self.single_applied(applied, "-")?;
        let mut list = Vec::new();

        for i in 0..n {
            let id = match current.take() {
                Some(id) => id,
                None => {
                    return Err(StratumError::resolution(
                        format!("-{n}"),
                        "relative downgrade ran past base",
                    ));
                }
            };

            let rev = self.get_exact(&id)?;

            if rev.down_revisions.len() > 1 {
                return Err(StratumError::resolution(
                    format!("-{n}"),
                    format!("revision '{}' is a merge point; downgrade to an explicit id", id),
                ));
            }

            current = rev.down_revisions.first().cloned();
            list.push(rev);

            if current.is_none() && i + 1 < n {
                return Err(StratumError::resolution(
                    format!("-{n}"),
                    "relative downgrade ran past base",
                ));
            }
        }

        Ok(list)
    }

    fn single_applied(&self, applied: &[String], sign: &str) -> StratumResult<Option<String>> {
        match applied.len() {
            0 => Ok(None),
            1 => Ok(Some(applied[0].clone())),
            _ => Err(StratumError::resolution(
                format!("{sign}N"),
                "relative references are ambiguous with multiple current heads",
            )),
        }
    }
}

fn parse_relative(target: &str) -> Option<i64> {
    let (sign, digits) = target.split_at(1.min(target.len()));

    if (sign == "+" || sign == "-") && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    {
        target.parse::<i64>().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn rev(id: &str, parents: &[&str], labels: &[&str], deps: &[&str]) -> Revision {
        let mut content = format!("-- revision: {id}\n");

        if !parents.is_empty() {
            content.push_str(&format!("-- parents: {}\n", parents.join(", ")));
        }

        if !labels.is_empty() {
            content.push_str(&format!("-- branch-labels: {}\n", labels.join(", ")));
        }

        if !deps.is_empty() {
            content.push_str(&format!("-- depends-on: {}\n", deps.join(", ")));
        }

        content.push_str(&format!("-- message: {id}\n\n-- upgrades\n\n-- downgrades\n"));
        Revision::parse(&content, Path::new(&format!("{id}.sql"))).unwrap()
    }

    fn chain() -> RevisionMap {
        // a1 <- a2 <- a3
        RevisionMap::build(vec![
            rev("a1", &[], &[], &[]),
            rev("a2", &["a1"], &[], &[]),
            rev("a3", &["a2"], &[], &[]),
        ])
        .unwrap()
    }

    fn branched() -> RevisionMap {
        // a1 <- a2 <- b1 (branch point at a2)
        //          <- c1 (branch "billing")
        RevisionMap::build(vec![
            rev("a1", &[], &[], &[]),
            rev("a2", &["a1"], &[], &[]),
            rev("b1", &["a2"], &[], &[]),
            rev("c1", &["a2"], &["billing"], &[]),
        ])
        .unwrap()
    }

    #[test]
    fn test_build_rejects_unknown_parent() {
        let err = RevisionMap::build(vec![rev("a1", &["nope"], &[], &[])]).unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn test_heads_and_branch_points() {
        let map = branched();
        let head_ids: Vec<_> = map.heads().iter().map(|r| r.revision.clone()).collect();
        assert_eq!(head_ids, vec!["b1", "c1"]);

        let points = map.branch_points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].revision, "a2");
    }

    #[test]
    fn test_effective_heads_resolve_dependencies() {
        // d2 depends on c1, so c1 stops being an effective head.
        let map = RevisionMap::build(vec![
            rev("c1", &[], &[], &[]),
            rev("d1", &[], &[], &[]),
            rev("d2", &["d1"], &[], &["c1"]),
        ])
        .unwrap();

        let strict: Vec<_> = map.heads().iter().map(|r| r.revision.clone()).collect();
        assert_eq!(strict, vec!["c1", "d2"]);

        let effective: Vec<_> = map
            .effective_heads()
            .iter()
            .map(|r| r.revision.clone())
            .collect();
        assert_eq!(effective, vec!["d2"]);
    }

    #[test]
    fn test_get_revisions_branch_forms() {
        let map = branched();

        let heads = map.get_revisions("billing@head").unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].revision, "c1");

        let base = map.get_revisions("billing@base").unwrap();
        assert_eq!(base[0].revision, "c1");

        let by_label = map.get_revisions("billing").unwrap();
        assert_eq!(by_label[0].revision, "c1");

        assert!(map.get_revisions("shipping").unwrap_err().is_resolution());
    }

    #[test]
    fn test_get_revisions_head_requires_single() {
        let map = branched();
        assert!(map.get_revisions("head").unwrap_err().is_resolution());
        assert_eq!(chain().get_revisions("head").unwrap()[0].revision, "a3");
    }

    #[test]
    fn test_id_prefix_resolution() {
        let map = RevisionMap::build(vec![
            rev("1723024512", &[], &[], &[]),
            rev("1723099999", &["1723024512"], &[], &[]),
        ])
        .unwrap();

        assert_eq!(
            map.resolve_id("17230245").unwrap().unwrap().revision,
            "1723024512"
        );
        assert!(map.resolve_id("1723").is_err());
        assert!(map.resolve_id("9999").unwrap().is_none());
    }

    #[test]
    fn test_upgrade_plan_from_empty() {
        let map = chain();
        let steps = map.upgrade_steps(&["heads".to_string()], &[]).unwrap();
        let ids: Vec<_> = steps
            .iter()
            .map(|s| match s {
                MigrationStep::Upgrade { revision, .. } => revision.revision.clone(),
                _ => panic!("expected upgrade steps"),
            })
            .collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);

        // The first step inserts, the rest replace their parent.
        match &steps[1] {
            MigrationStep::Upgrade { replaces, .. } => assert_eq!(replaces, &vec!["a1".to_string()]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_upgrade_plan_skips_applied() {
        let map = chain();
        let steps = map
            .upgrade_steps(&["heads".to_string()], &["a2".to_string()])
            .unwrap();
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_upgrade_relative() {
        let map = chain();
        let steps = map.upgrade_steps(&["+2".to_string()], &[]).unwrap();
        assert_eq!(steps.len(), 2);

        let steps = map
            .upgrade_steps(&["+1".to_string()], &["a1".to_string()])
            .unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0] {
            MigrationStep::Upgrade { revision, .. } => assert_eq!(revision.revision, "a2"),
            _ => unreachable!(),
        }

        // Past the head.
        assert!(map
            .upgrade_steps(&["+5".to_string()], &[])
            .unwrap_err()
            .is_resolution());
    }

    #[test]
    fn test_downgrade_relative() {
        let map = chain();
        let steps = map
            .downgrade_steps("-1", &["a3".to_string()])
            .unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0] {
            MigrationStep::Downgrade { revision, restores } => {
                assert_eq!(revision.revision, "a3");
                assert_eq!(restores, &vec!["a2".to_string()]);
            }
            _ => unreachable!(),
        }

        // Nothing applied: nothing to do.
        assert!(map.downgrade_steps("-1", &[]).unwrap().is_empty());

        // Walks past base.
        assert!(map
            .downgrade_steps("-5", &["a3".to_string()])
            .unwrap_err()
            .is_resolution());
    }

    #[test]
    fn test_downgrade_to_base_and_target() {
        let map = chain();

        let steps = map.downgrade_steps("base", &["a3".to_string()]).unwrap();
        assert_eq!(steps.len(), 3);

        let steps = map.downgrade_steps("a1", &["a3".to_string()]).unwrap();
        let ids: Vec<_> = steps
            .iter()
            .map(|s| match s {
                MigrationStep::Downgrade { revision, .. } => revision.revision.clone(),
                _ => panic!("expected downgrade steps"),
            })
            .collect();
        assert_eq!(ids, vec!["a3", "a2"]);

        // Target must be an ancestor.
        let map = branched();
        assert!(map
            .downgrade_steps("b1", &["c1".to_string()])
            .unwrap_err()
            .is_resolution());
    }

    #[test]
    fn test_stamp_plan() {
        let map = chain();

        let steps = map.stamp_steps(&["heads".to_string()], &[]).unwrap();
        match &steps[0] {
            MigrationStep::Stamp { remove, add } => {
                assert!(remove.is_empty());
                assert_eq!(add, &vec!["a3".to_string()]);
            }
            _ => unreachable!(),
        }

        // Stamping the current position is a no-op.
        assert!(map
            .stamp_steps(&["a3".to_string()], &["a3".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_walk_bounds() {
        let map = chain();

        let all = map
            .walk(&["base".to_string()], &["heads".to_string()])
            .unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.revision.clone()).collect();
        assert_eq!(ids, vec!["a3", "a2", "a1"]);

        // Lower bound is inclusive.
        let since = map
            .walk(&["a2".to_string()], &["heads".to_string()])
            .unwrap();
        let ids: Vec<_> = since.iter().map(|r| r.revision.clone()).collect();
        assert_eq!(ids, vec!["a3", "a2"]);
    }
}
