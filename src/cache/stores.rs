//! The concrete entity caches and their remote-backed operations.
//!
//! One store per relationship, hand-wired rather than derived: the
//! invalidation rule table names these stores, and the UI reaches remote
//! data exclusively through the wrappers here. Mutation wrappers run the
//! optimistic protocol and return; publishing the matching `DomainEvent`
//! afterwards is the caller's job.

use anyhow::Result;
use futures::future::join_all;

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::SyncError;
use crate::events::CacheId;
use crate::models::{
    Award, ChampionshipId, Cluster, ClusterId, Coach, Contest, ContestId, Judge, JudgeId,
    NewJudge, NewTeam, Scoresheet, ScoresheetKey, SheetType, SubmissionStatus, Team, TeamId,
    TeamTotal,
};
use crate::sync::{attach, restore, Replicator, StoreBackend};

use super::mutation;
use super::store::EntityStore;

pub struct Stores {
    api: ApiClient,
    pub judges_by_cluster: EntityStore<ClusterId, Vec<Judge>>,
    pub teams_by_cluster: EntityStore<ClusterId, Vec<Team>>,
    pub clusters_by_contest: EntityStore<ContestId, Vec<Cluster>>,
    pub contest_by_team: EntityStore<TeamId, Contest>,
    pub coach_by_team: EntityStore<TeamId, Coach>,
    pub awards_by_team: EntityStore<TeamId, Vec<Award>>,
    pub scoresheets: EntityStore<ScoresheetKey, Scoresheet>,
    pub submission_status_by_cluster: EntityStore<ClusterId, SubmissionStatus>,
    pub total_by_team: EntityStore<TeamId, TeamTotal>,
    pub contests_by_championship: EntityStore<ChampionshipId, Vec<Contest>>,
}

impl Stores {
    /// In-memory stores with no persistence. The starting point for tests
    /// and for surfaces that never opt into cross-tab sync.
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            judges_by_cluster: EntityStore::new("judges_by_cluster"),
            teams_by_cluster: EntityStore::new("teams_by_cluster"),
            clusters_by_contest: EntityStore::new("clusters_by_contest"),
            contest_by_team: EntityStore::new("contest_by_team"),
            coach_by_team: EntityStore::new("coach_by_team"),
            awards_by_team: EntityStore::new("awards_by_team"),
            scoresheets: EntityStore::new("scoresheets"),
            submission_status_by_cluster: EntityStore::new("submission_status_by_cluster"),
            total_by_team: EntityStore::new("total_by_team"),
            contests_by_championship: EntityStore::new("contests_by_championship"),
        }
    }

    /// Stores with the persisted tiers wired up: team rosters go to the
    /// durable directory, per-session caches to the session directory.
    /// Previously persisted state is restored before the write hooks
    /// attach, and every persisted store is registered with the returned
    /// replicator (not yet started).
    pub fn with_persistence(api: ApiClient, config: &Config) -> Result<(Self, Replicator)> {
        let stores = Self::new(api);
        let mut replicator = Replicator::new();

        let teams_backend = StoreBackend::new(&config.durable_dir, "teams_by_cluster")?;
        restore(&stores.teams_by_cluster, &teams_backend)?;
        attach(&stores.teams_by_cluster, teams_backend.clone());
        replicator.register(stores.teams_by_cluster.clone(), teams_backend);

        let judges_backend = StoreBackend::new(&config.session_dir, "judges_by_cluster")?;
        restore(&stores.judges_by_cluster, &judges_backend)?;
        attach(&stores.judges_by_cluster, judges_backend.clone());
        replicator.register(stores.judges_by_cluster.clone(), judges_backend);

        let sheets_backend = StoreBackend::new(&config.session_dir, "scoresheets")?;
        restore(&stores.scoresheets, &sheets_backend)?;
        attach(&stores.scoresheets, sheets_backend.clone());
        replicator.register(stores.scoresheets.clone(), sheets_backend);

        let status_backend =
            StoreBackend::new(&config.session_dir, "submission_status_by_cluster")?;
        restore(&stores.submission_status_by_cluster, &status_backend)?;
        attach(&stores.submission_status_by_cluster, status_backend.clone());
        replicator.register(stores.submission_status_by_cluster.clone(), status_backend);

        Ok((stores, replicator))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // ===== Reads =====

    pub async fn judges(&self, cluster_id: ClusterId, force: bool) -> Result<Vec<Judge>, SyncError> {
        self.judges_by_cluster
            .get_or_fetch(cluster_id, force, self.api.fetch_cluster_judges(cluster_id))
            .await
    }

    pub async fn teams(&self, cluster_id: ClusterId, force: bool) -> Result<Vec<Team>, SyncError> {
        self.teams_by_cluster
            .get_or_fetch(cluster_id, force, self.api.fetch_cluster_teams(cluster_id))
            .await
    }

    pub async fn clusters(
        &self,
        contest_id: ContestId,
        force: bool,
    ) -> Result<Vec<Cluster>, SyncError> {
        self.clusters_by_contest
            .get_or_fetch(contest_id, force, self.api.fetch_contest_clusters(contest_id))
            .await
    }

    pub async fn contest_for_team(
        &self,
        team_id: TeamId,
        force: bool,
    ) -> Result<Contest, SyncError> {
        self.contest_by_team
            .get_or_fetch(team_id, force, self.api.fetch_team_contest(team_id))
            .await
    }

    pub async fn coach(&self, team_id: TeamId, force: bool) -> Result<Coach, SyncError> {
        self.coach_by_team
            .get_or_fetch(team_id, force, self.api.fetch_team_coach(team_id))
            .await
    }

    pub async fn awards(&self, team_id: TeamId, force: bool) -> Result<Vec<Award>, SyncError> {
        self.awards_by_team
            .get_or_fetch(team_id, force, self.api.fetch_team_awards(team_id))
            .await
    }

    pub async fn scoresheet(
        &self,
        key: ScoresheetKey,
        force: bool,
    ) -> Result<Scoresheet, SyncError> {
        self.scoresheets
            .get_or_fetch(key, force, self.api.fetch_scoresheet(&key))
            .await
    }

    pub async fn submission_status(
        &self,
        cluster_id: ClusterId,
        force: bool,
    ) -> Result<SubmissionStatus, SyncError> {
        self.submission_status_by_cluster
            .get_or_fetch(cluster_id, force, self.api.fetch_submission_status(cluster_id))
            .await
    }

    pub async fn team_total(&self, team_id: TeamId, force: bool) -> Result<TeamTotal, SyncError> {
        self.total_by_team
            .get_or_fetch(team_id, force, self.api.fetch_team_total(team_id))
            .await
    }

    pub async fn championship_contests(
        &self,
        championship_id: ChampionshipId,
        force: bool,
    ) -> Result<Vec<Contest>, SyncError> {
        self.contests_by_championship
            .get_or_fetch(
                championship_id,
                force,
                self.api.fetch_championship_contests(championship_id),
            )
            .await
    }

    /// Prefetch everything a cluster view needs in one go.
    pub async fn warm_cluster(&self, cluster_id: ClusterId) -> Result<(), SyncError> {
        tokio::try_join!(
            self.judges(cluster_id, false),
            self.teams(cluster_id, false),
            self.submission_status(cluster_id, false),
        )?;
        Ok(())
    }

    /// Fetch one team's scoresheets of a given type across several judges.
    pub async fn scoresheets_for_team(
        &self,
        team_id: TeamId,
        judge_ids: &[JudgeId],
        sheet_type: SheetType,
    ) -> Result<Vec<Scoresheet>, SyncError> {
        let fetches = judge_ids.iter().map(|&judge_id| {
            let key = ScoresheetKey {
                team_id,
                judge_id,
                sheet_type,
            };
            self.scoresheet(key, false)
        });
        join_all(fetches).await.into_iter().collect()
    }

    // ===== Judge mutations =====

    /// Create a judge in a cluster. The judge appears in the cached list
    /// immediately (with a placeholder id) and is replaced by the server's
    /// authoritative object on success.
    pub async fn add_judge(
        &self,
        cluster_id: ClusterId,
        new: NewJudge,
    ) -> Result<Judge, SyncError> {
        let placeholder = Judge {
            id: 0,
            name: new.name.clone(),
            cluster_id,
            role: new.role.clone(),
            email: new.email.clone(),
        };
        let store = self.judges_by_cluster.clone();
        let mut created: Option<Judge> = None;
        let created_slot = &mut created;
        let api = &self.api;

        mutation::execute(
            &self.judges_by_cluster,
            cluster_id,
            move |list| {
                list.map(|mut l| {
                    l.push(placeholder);
                    l
                })
            },
            async move {
                let judge = api.create_judge(cluster_id, &new).await?;
                // Adopt into the list as committed under the key lock, not a
                // pre-lock snapshot: a neighboring mutation may have rolled
                // back while the create was in flight.
                let adopted = store.get(&cluster_id).map(|mut l| {
                    match l.iter_mut().find(|j| j.id == 0) {
                        Some(slot) => *slot = judge.clone(),
                        None => l.push(judge.clone()),
                    }
                    l
                });
                *created_slot = Some(judge);
                Ok(adopted)
            },
        )
        .await?;

        created.ok_or(SyncError::Invariant("create settled without a server judge"))
    }

    pub async fn update_judge(&self, judge: Judge) -> Result<(), SyncError> {
        let cluster_id = judge.cluster_id;
        let optimistic = judge.clone();
        let store = self.judges_by_cluster.clone();
        let api = &self.api;

        mutation::execute(
            &self.judges_by_cluster,
            cluster_id,
            move |list| {
                list.map(|mut l| {
                    if let Some(slot) = l.iter_mut().find(|j| j.id == optimistic.id) {
                        *slot = optimistic;
                    }
                    l
                })
            },
            async move {
                let updated = api.update_judge(&judge).await?;
                let adopted = store.get(&cluster_id).map(|mut l| {
                    if let Some(slot) = l.iter_mut().find(|j| j.id == updated.id) {
                        *slot = updated;
                    }
                    l
                });
                Ok(adopted)
            },
        )
        .await
    }

    /// Remove a judge from a cluster. A removal that fails ambiguously
    /// refetches the cluster after rollback.
    pub async fn delete_judge(
        &self,
        cluster_id: ClusterId,
        judge_id: JudgeId,
    ) -> Result<(), SyncError> {
        let api = &self.api;
        mutation::execute_with_refetch(
            &self.judges_by_cluster,
            cluster_id,
            move |list| {
                list.map(|mut l| {
                    l.retain(|j| j.id != judge_id);
                    l
                })
            },
            async move {
                api.delete_judge(judge_id).await?;
                Ok(None)
            },
            self.api.fetch_cluster_judges(cluster_id),
        )
        .await
    }

    /// Move a judge between clusters: the one mutation that spans two keys
    /// of the same store. On failure both cluster snapshots are restored
    /// and both clusters are re-derived from the server.
    pub async fn relocate_judge(
        &self,
        judge_id: JudgeId,
        from: ClusterId,
        to: ClusterId,
    ) -> Result<(), SyncError> {
        if from == to {
            return Ok(());
        }

        mutation::execute_across(
            &self.judges_by_cluster,
            from,
            to,
            move |from_list, to_list| Self::transfer_judge(judge_id, to, from_list, to_list),
            self.api.move_judge(judge_id, from, to),
            |cluster| self.api.fetch_cluster_judges(cluster),
        )
        .await
    }

    /// Optimistic shape of a judge move: drop from the source list, append
    /// to the destination list with the cluster rebound, each only where
    /// that cluster is cached.
    fn transfer_judge(
        judge_id: JudgeId,
        to: ClusterId,
        from_list: Option<Vec<Judge>>,
        to_list: Option<Vec<Judge>>,
    ) -> (Option<Vec<Judge>>, Option<Vec<Judge>>) {
        let moved = from_list
            .as_ref()
            .and_then(|list| list.iter().find(|j| j.id == judge_id).cloned());

        let from_list = from_list.map(|mut l| {
            l.retain(|j| j.id != judge_id);
            l
        });
        let to_list = match (moved, to_list) {
            (Some(mut judge), Some(mut l)) => {
                judge.cluster_id = to;
                l.push(judge);
                Some(l)
            }
            (_, to_list) => to_list,
        };
        (from_list, to_list)
    }

    // ===== Team mutations =====

    /// Register a team in a cluster. Mirrors [`Stores::add_judge`]: a
    /// placeholder row shows immediately and the server row replaces it.
    pub async fn add_team(&self, cluster_id: ClusterId, new: NewTeam) -> Result<Team, SyncError> {
        let store = self.teams_by_cluster.clone();
        let mut created: Option<Team> = None;
        let created_slot = &mut created;
        let api = &self.api;
        let optimistic = new.clone();

        mutation::execute(
            &self.teams_by_cluster,
            cluster_id,
            move |list| {
                list.map(|mut l| {
                    let contest_id = l.first().map(|t| t.contest_id).unwrap_or_default();
                    l.push(Team {
                        id: 0,
                        number: optimistic.number,
                        name: optimistic.name,
                        cluster_id,
                        contest_id,
                        affiliation: optimistic.affiliation,
                    });
                    l
                })
            },
            async move {
                let team = api.create_team(cluster_id, &new).await?;
                // Same commit-time adoption as add_judge: replace the
                // placeholder row in the list as it stands under the lock.
                let adopted = store.get(&cluster_id).map(|mut l| {
                    match l.iter_mut().find(|t| t.id == 0) {
                        Some(slot) => *slot = team.clone(),
                        None => l.push(team.clone()),
                    }
                    l
                });
                *created_slot = Some(team);
                Ok(adopted)
            },
        )
        .await?;

        created.ok_or(SyncError::Invariant("create settled without a server team"))
    }

    pub async fn update_team(&self, team: Team) -> Result<(), SyncError> {
        let cluster_id = team.cluster_id;
        let optimistic = team.clone();
        let store = self.teams_by_cluster.clone();
        let api = &self.api;

        mutation::execute(
            &self.teams_by_cluster,
            cluster_id,
            move |list| {
                list.map(|mut l| {
                    if let Some(slot) = l.iter_mut().find(|t| t.id == optimistic.id) {
                        *slot = optimistic;
                    }
                    l
                })
            },
            async move {
                let updated = api.update_team(&team).await?;
                let adopted = store.get(&cluster_id).map(|mut l| {
                    if let Some(slot) = l.iter_mut().find(|t| t.id == updated.id) {
                        *slot = updated;
                    }
                    l
                });
                Ok(adopted)
            },
        )
        .await
    }

    pub async fn delete_team(
        &self,
        cluster_id: ClusterId,
        team_id: TeamId,
    ) -> Result<(), SyncError> {
        let api = &self.api;
        mutation::execute_with_refetch(
            &self.teams_by_cluster,
            cluster_id,
            move |list| {
                list.map(|mut l| {
                    l.retain(|t| t.id != team_id);
                    l
                })
            },
            async move {
                api.delete_team(team_id).await?;
                Ok(None)
            },
            self.api.fetch_cluster_teams(cluster_id),
        )
        .await
    }

    // ===== Scoresheet mutations =====

    /// Save a draft. The optimistic sheet is visible immediately; the
    /// server's saved sheet (with its recomputed total) replaces it on
    /// success.
    pub async fn save_scoresheet(&self, sheet: Scoresheet) -> Result<(), SyncError> {
        let key = sheet.key();
        let optimistic = sheet.clone();
        let api = &self.api;

        mutation::execute(
            &self.scoresheets,
            key,
            move |_| Some(optimistic),
            async move { api.save_scoresheet(&sheet).await.map(Some) },
        )
        .await
    }

    pub async fn submit_scoresheet(&self, key: ScoresheetKey) -> Result<(), SyncError> {
        let api = &self.api;
        mutation::execute(
            &self.scoresheets,
            key,
            |current| {
                current.map(|mut sheet| {
                    sheet.submitted = true;
                    sheet
                })
            },
            async move {
                api.submit_scoresheet(&key).await?;
                Ok(None)
            },
        )
        .await
    }

    // ===== Purging =====

    /// Purge one cache whole, as named by the invalidation rule table.
    pub fn purge_cache(&self, id: CacheId) {
        match id {
            CacheId::JudgesByCluster => self.judges_by_cluster.purge_all(),
            CacheId::TeamsByCluster => self.teams_by_cluster.purge_all(),
            CacheId::ClustersByContest => self.clusters_by_contest.purge_all(),
            CacheId::ContestByTeam => self.contest_by_team.purge_all(),
            CacheId::CoachByTeam => self.coach_by_team.purge_all(),
            CacheId::AwardsByTeam => self.awards_by_team.purge_all(),
            CacheId::Scoresheets => self.scoresheets.purge_all(),
            CacheId::SubmissionStatusByCluster => self.submission_status_by_cluster.purge_all(),
            CacheId::TotalByTeam => self.total_by_team.purge_all(),
            CacheId::ContestsByChampionship => self.contests_by_championship.purge_all(),
        }
    }

    /// Clear every cache. Called at session end.
    pub fn purge_everything(&self) {
        self.judges_by_cluster.purge_all();
        self.teams_by_cluster.purge_all();
        self.clusters_by_contest.purge_all();
        self.contest_by_team.purge_all();
        self.coach_by_team.purge_all();
        self.awards_by_team.purge_all();
        self.scoresheets.purge_all();
        self.submission_status_by_cluster.purge_all();
        self.total_by_team.purge_all();
        self.contests_by_championship.purge_all();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> Stores {
        Stores::new(ApiClient::new("http://localhost:0").unwrap())
    }

    fn judge(id: JudgeId, cluster_id: ClusterId) -> Judge {
        Judge {
            id,
            name: format!("Judge {}", id),
            cluster_id,
            role: None,
            email: None,
        }
    }

    #[test]
    fn test_purge_cache_targets_the_named_store() {
        let stores = stores();
        stores.judges_by_cluster.put(5, vec![judge(1, 5)]);
        stores.judges_by_cluster.put(6, vec![judge(2, 6)]);
        stores.total_by_team.put(
            9,
            TeamTotal {
                team_id: 9,
                total: 87.5,
                rank: None,
            },
        );

        // Type-level purge: every cluster's judge list goes, not just one.
        stores.purge_cache(CacheId::JudgesByCluster);
        assert!(stores.judges_by_cluster.is_empty());
        assert!(stores.total_by_team.get(&9).is_some());

        stores.purge_cache(CacheId::TotalByTeam);
        assert!(stores.total_by_team.is_empty());
    }

    #[test]
    fn test_purge_everything_clears_all_stores() {
        let stores = stores();
        stores.judges_by_cluster.put(5, vec![judge(1, 5)]);
        stores.teams_by_cluster.put(
            5,
            vec![Team {
                id: 9,
                number: None,
                name: "Rockets".to_string(),
                cluster_id: 5,
                contest_id: 3,
                affiliation: None,
            }],
        );

        stores.purge_everything();
        assert!(stores.judges_by_cluster.is_empty());
        assert!(stores.teams_by_cluster.is_empty());
    }

    #[test]
    fn test_transfer_judge_moves_and_rebinds_cluster() {
        let (from, to) = Stores::transfer_judge(
            1,
            6,
            Some(vec![judge(1, 5), judge(2, 5)]),
            Some(vec![judge(3, 6)]),
        );

        assert_eq!(from.unwrap(), vec![judge(2, 5)]);
        let to = to.unwrap();
        assert_eq!(to.len(), 2);
        assert_eq!(to[1].id, 1);
        assert_eq!(to[1].cluster_id, 6);
    }

    #[test]
    fn test_transfer_judge_leaves_uncached_destination_absent() {
        let (from, to) =
            Stores::transfer_judge(1, 6, Some(vec![judge(1, 5), judge(2, 5)]), None);

        assert_eq!(from.unwrap(), vec![judge(2, 5)]);
        assert!(to.is_none());
    }

    #[tokio::test]
    async fn test_failed_relocation_rolls_back_both_clusters() {
        // Port 0 is unreachable, so the move and both refetches fail; the
        // restored snapshots must survive.
        let stores = stores();
        stores.judges_by_cluster.put(5, vec![judge(1, 5), judge(2, 5)]);
        stores.judges_by_cluster.put(6, vec![judge(3, 6)]);

        let result = stores.relocate_judge(1, 5, 6).await;

        assert!(result.is_err());
        assert_eq!(
            stores.judges_by_cluster.get(&5).unwrap(),
            vec![judge(1, 5), judge(2, 5)]
        );
        assert_eq!(stores.judges_by_cluster.get(&6).unwrap(), vec![judge(3, 6)]);
    }

    #[tokio::test]
    async fn test_relocation_to_same_cluster_is_a_noop() {
        let stores = stores();
        stores.judges_by_cluster.put(5, vec![judge(1, 5)]);

        stores.relocate_judge(1, 5, 5).await.unwrap();
        assert_eq!(stores.judges_by_cluster.get(&5).unwrap(), vec![judge(1, 5)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_create_adoption_ignores_rolled_back_neighbor_state() {
        use std::time::Duration;

        let store: EntityStore<i64, Vec<String>> = EntityStore::new("judges_by_cluster");
        store.put(5, vec!["Ada".to_string(), "Grace".to_string()]);

        // A rename that fails only after the create below has queued on the
        // same key lock.
        let store_a = store.clone();
        let rename = tokio::spawn(async move {
            mutation::execute(
                &store_a,
                5,
                |list| {
                    list.map(|mut l| {
                        l[0] = "Ada RENAMED".to_string();
                        l
                    })
                },
                async {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    Err(SyncError::Validation("name taken".to_string()))
                },
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;

        // The create adopts from the state committed under the key lock,
        // the same commit-time read add_judge performs.
        let store_b = store.clone();
        let store_b2 = store.clone();
        let create = tokio::spawn(async move {
            mutation::execute(
                &store_b,
                5,
                |list| {
                    list.map(|mut l| {
                        l.push("draft".to_string());
                        l
                    })
                },
                async move {
                    let adopted = store_b2.get(&5).map(|mut l| {
                        if let Some(slot) = l.iter_mut().find(|j| j.as_str() == "draft") {
                            *slot = "Mary".to_string();
                        }
                        l
                    });
                    Ok(adopted)
                },
            )
            .await
        });

        assert!(rename.await.unwrap().is_err());
        create.await.unwrap().unwrap();

        // The failed rename's optimistic value must not resurface through
        // the create's commit.
        assert_eq!(
            store.get(&5).unwrap(),
            vec!["Ada".to_string(), "Grace".to_string(), "Mary".to_string()]
        );
    }
}
