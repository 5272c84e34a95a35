//! Browse cursor, like recording and mutual-match fan-out.
//!
//! The candidate list is a snapshot taken when browsing starts. Like edges are
//! written through the record store, whose uniqueness constraint decides
//! whether a like is new; a rejected duplicate produces no notifications.

use std::sync::Arc;

use roomie_store::{RecordStore, StoreResult};
use roomie_types::{ActorId, CandidateFilter, LikeEdge, Profile};

use crate::bot_config::MatchPreference;
use crate::errors::{CoreError, CoreResult};
use crate::intents::{match_card, Content, Intent, Keyboard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseMode {
    Search,
    /// Browsing the participants who already liked the actor.
    Likers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Candidate(Profile),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseSession {
    pub mode: BrowseMode,
    candidates: Vec<Profile>,
    cursor: usize,
}

impl BrowseSession {
    pub fn new(mode: BrowseMode, candidates: Vec<Profile>) -> Self {
        Self {
            mode,
            candidates,
            cursor: 0,
        }
    }

    /// Returns the candidate at the cursor and moves past it.
    pub fn advance(&mut self) -> Advance {
        match self.candidates.get(self.cursor) {
            Some(candidate) => {
                self.cursor += 1;
                Advance::Candidate(candidate.clone())
            }
            None => Advance::Exhausted,
        }
    }

    /// Candidate most recently returned by [`BrowseSession::advance`].
    pub fn current(&self) -> CoreResult<&Profile> {
        let index = self
            .cursor
            .checked_sub(1)
            .ok_or_else(|| CoreError::State("no candidate has been shown yet".to_string()))?;
        self.candidates
            .get(index)
            .ok_or_else(|| CoreError::State(format!("cursor {} is past the candidate list", self.cursor)))
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeKind {
    /// The edge already existed.
    Duplicate,
    Recorded { likes_received: u64 },
    Mutual { likes_received: u64 },
    /// The edge was written but the follow-up reads failed; only the requester is answered.
    Unconfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeOutcome {
    pub candidate: Profile,
    pub kind: LikeKind,
}

impl LikeOutcome {
    /// Intents for the requester and the liked candidate. Handles are rendered on match cards.
    pub fn intents(
        &self,
        requester: &Profile,
        requester_handle: Option<&str>,
        candidate_handle: Option<&str>,
    ) -> Vec<Intent> {
        let likes_received = match self.kind {
            LikeKind::Duplicate => {
                return vec![Intent::reply(format!(
                    "You already liked {}.",
                    self.candidate.name
                ))];
            }
            LikeKind::Unconfirmed => {
                return vec![Intent::reply(format!(
                    "Like sent to {}.",
                    self.candidate.name
                ))];
            }
            LikeKind::Recorded { likes_received } | LikeKind::Mutual { likes_received } => {
                likes_received
            }
        };

        let mut intents = vec![Intent::NotifyUser {
            recipient: self.candidate.actor_id,
            content: Content::text(format!(
                "Someone liked your profile! You have {likes_received} like(s) in total."
            )),
            keyboard: Some(Keyboard::ViewLikers),
        }];
        match self.kind {
            LikeKind::Mutual { .. } => {
                intents.push(Intent::Reply {
                    content: match_card(&self.candidate, candidate_handle),
                    keyboard: None,
                });
                intents.push(Intent::NotifyUser {
                    recipient: self.candidate.actor_id,
                    content: match_card(requester, requester_handle),
                    keyboard: None,
                });
            }
            _ => intents.insert(
                0,
                Intent::reply(format!("Like sent to {}.", self.candidate.name)),
            ),
        }
        intents
    }
}

pub struct MatchingEngine {
    store: Arc<dyn RecordStore>,
    preference: MatchPreference,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn RecordStore>, preference: MatchPreference) -> Self {
        Self { store, preference }
    }

    pub async fn start_search(&self, requester: &Profile) -> CoreResult<BrowseSession> {
        let candidates = self
            .store
            .list_candidates(CandidateFilter {
                requester: requester.actor_id,
                gender: self.preference.filter_for(requester.gender),
            })
            .await?;
        tracing::debug!(
            actor_id = %requester.actor_id,
            candidates = candidates.len(),
            "browse snapshot taken"
        );
        Ok(BrowseSession::new(BrowseMode::Search, candidates))
    }

    pub async fn start_likers(&self, actor: ActorId) -> CoreResult<BrowseSession> {
        let likers = self.store.list_likers(actor).await?;
        tracing::debug!(actor_id = %actor, likers = likers.len(), "likers snapshot taken");
        Ok(BrowseSession::new(BrowseMode::Likers, likers))
    }

    /// Likes the candidate last returned by `advance`.
    pub async fn like(&self, requester: ActorId, session: &BrowseSession) -> CoreResult<LikeOutcome> {
        let candidate = session.current()?.clone();
        if candidate.actor_id == requester {
            return Err(CoreError::State("cannot like own profile".to_string()));
        }
        if !self.store.profile_exists(candidate.actor_id).await? {
            return Err(CoreError::NotFound(format!("profile {}", candidate.actor_id)));
        }

        let edge = LikeEdge {
            from: requester,
            to: candidate.actor_id,
        };
        if !self.store.create_like(edge).await? {
            tracing::debug!(
                from = %edge.from,
                to = %edge.to,
                "duplicate like ignored"
            );
            return Ok(LikeOutcome {
                candidate,
                kind: LikeKind::Duplicate,
            });
        }

        // The edge is committed; a failed read from here on only drops notifications.
        let (likes_received, mutual) = match self.follow_up(edge).await {
            Ok(reads) => reads,
            Err(error) => {
                tracing::warn!(
                    from = %edge.from,
                    to = %edge.to,
                    error = %error,
                    "like recorded but follow-up reads failed; notifications skipped"
                );
                return Ok(LikeOutcome {
                    candidate,
                    kind: LikeKind::Unconfirmed,
                });
            }
        };
        tracing::info!(
            from = %edge.from,
            to = %edge.to,
            likes_received,
            mutual,
            "like recorded"
        );
        let kind = if mutual {
            LikeKind::Mutual { likes_received }
        } else {
            LikeKind::Recorded { likes_received }
        };
        Ok(LikeOutcome { candidate, kind })
    }

    async fn follow_up(&self, edge: LikeEdge) -> StoreResult<(u64, bool)> {
        let likes_received = self.store.count_likes_received(edge.to).await?;
        let mutual = self.store.has_mutual_like(edge.from, edge.to).await?;
        Ok((likes_received, mutual))
    }
}
