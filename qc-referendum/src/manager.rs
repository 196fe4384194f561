use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use qc_faults::FaultConfig;
use qc_transport::{ApplicationDispatcher, Conversation, ConversationTable};
use qc_wire::{AppMessage, VoteAnswer};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ReferendumError;
use crate::eval::evaluate;
use crate::ids::VoteId;

/// Server-side referendum state (spec.md §3, "Host referendum").
pub struct HostReferendum {
    pub vote_id: VoteId,
    pub question: Vec<u8>,
    pub ongoing: bool,
    pub participants: HashMap<u32, Arc<Conversation>>,
    pub who: HashSet<u32>,
    pub votes: HashMap<u16, u64>,
    pub result: Option<VoteAnswer>,
}

/// Client-side referendum state: the node's own answer, possibly later
/// overwritten by the server's broadcast result.
pub struct ClientReferendum {
    pub vote_id: VoteId,
    pub question: Vec<u8>,
    pub result: VoteAnswer,
}

/// Holds hosted and participating referendums behind independent locks, and
/// reaches back into the conversation table through a non-owning `Arc`
/// handle rather than owning conversations directly — this is how the
/// conversation <-> referendum manager cycle described in spec.md §9 is
/// broken (see also `qc_transport::ApplicationDispatcher`, the trait this
/// type implements).
pub struct ReferendumManager {
    table: Arc<ConversationTable>,
    faults: Arc<FaultConfig>,
    hosted: Mutex<HashMap<VoteId, HostReferendum>>,
    participating: Mutex<HashMap<VoteId, ClientReferendum>>,
}

impl ReferendumManager {
    pub fn new(table: Arc<ConversationTable>, faults: Arc<FaultConfig>) -> Arc<Self> {
        Arc::new(Self {
            table,
            faults,
            hosted: Mutex::new(HashMap::new()),
            participating: Mutex::new(HashMap::new()),
        })
    }

    /// Server role: a client proposed `question`. Snapshots the current
    /// conversation table as the participant set and broadcasts the
    /// question to every participant.
    pub async fn create_from_client_request(
        &self,
        vote_id: VoteId,
        question: Vec<u8>,
    ) -> Result<(), ReferendumError> {
        let mut hosted = self.hosted.lock().await;
        if hosted.contains_key(&vote_id) {
            return Err(ReferendumError::DuplicateVoteId(vote_id));
        }

        let participants: HashMap<u32, Arc<Conversation>> =
            self.table.all().await.into_iter().map(|c| (c.conv_id, c)).collect();

        hosted.insert(
            vote_id,
            HostReferendum {
                vote_id,
                question: question.clone(),
                ongoing: true,
                participants: participants.clone(),
                who: HashSet::new(),
                votes: HashMap::new(),
                result: None,
            },
        );
        drop(hosted);

        for conv in participants.values() {
            conv.send_vote_broadcast(vote_id.to_wire(), question.clone()).await;
        }
        Ok(())
    }

    /// Client role: the server broadcast `question`. Computes the local
    /// answer and responds.
    pub async fn handle_question(&self, asker: Arc<Conversation>, vote_id: VoteId, question: Vec<u8>) {
        let answer = self.compute_question(&question);
        self.participating
            .lock()
            .await
            .insert(vote_id, ClientReferendum { vote_id, question, result: answer });
        asker.send_response(vote_id.to_wire(), answer).await;
    }

    /// Evaluates `question` as a boolean expression, then applies the
    /// fault-injection defect knob (spec.md §4.7, §4.8).
    pub fn compute_question(&self, question: &[u8]) -> VoteAnswer {
        let text = String::from_utf8_lossy(question);
        let answer = match evaluate(&text) {
            Ok(true) => VoteAnswer::Sat,
            Ok(false) => VoteAnswer::Unsat,
            Err(e) => {
                info!(error = %e, "boolean expression evaluation failed");
                VoteAnswer::SyntaxError
            }
        };
        self.faults.maybe_defect(answer)
    }

    /// Server role: a participant voted.
    pub async fn handle_response(
        &self,
        responder: u32,
        vote_id: VoteId,
        response: VoteAnswer,
    ) -> Result<(), ReferendumError> {
        let mut hosted = self.hosted.lock().await;
        let referendum =
            hosted.get_mut(&vote_id).ok_or(ReferendumError::UnknownReferendum(vote_id))?;

        if !referendum.ongoing {
            return Err(ReferendumError::NotOngoing(vote_id));
        }
        if !referendum.participants.contains_key(&responder) {
            return Err(ReferendumError::NotAParticipant { vote_id, responder });
        }
        if !referendum.who.insert(responder) {
            return Err(ReferendumError::DoubleVote { vote_id, responder });
        }

        *referendum.votes.entry(response as u16).or_insert(0) += 1;
        self.broadcast_result_if_decided(referendum).await;
        Ok(())
    }

    /// The early-termination rule (spec.md §4.7): once any response code's
    /// tally exceeds the number of participants still outstanding, that
    /// code has mathematically won regardless of how the rest vote.
    async fn broadcast_result_if_decided(&self, referendum: &mut HostReferendum) {
        if !referendum.ongoing {
            return;
        }

        let missing = referendum.participants.len() - referendum.who.len();
        let winner = referendum
            .votes
            .iter()
            .find(|&(_, &count)| count as usize > missing)
            .map(|(&code, _)| code);

        let Some(code) = winner else { return };
        let answer = VoteAnswer::from_u16(code).unwrap_or(VoteAnswer::SyntaxError);
        referendum.result = Some(answer);
        referendum.ongoing = false;

        for conv in referendum.participants.values() {
            conv.send_result_broadcast(referendum.vote_id.to_wire(), answer).await;
        }
    }

    /// Current state of a hosted referendum, if this node is hosting one
    /// under `vote_id`: `(ongoing, result)`.
    pub async fn host_status(&self, vote_id: VoteId) -> Option<(bool, Option<VoteAnswer>)> {
        self.hosted.lock().await.get(&vote_id).map(|r| (r.ongoing, r.result))
    }

    /// The locally stored answer for a referendum this node is participating
    /// in as a client, if any.
    pub async fn client_answer(&self, vote_id: VoteId) -> Option<VoteAnswer> {
        self.participating.lock().await.get(&vote_id).map(|r| r.result)
    }

    /// Client role: the server declared a result. Overwrites the locally
    /// stored answer if it disagrees.
    pub async fn handle_result(&self, vote_id: VoteId, answer: VoteAnswer) {
        let mut participating = self.participating.lock().await;
        match participating.get_mut(&vote_id) {
            Some(referendum) if referendum.result != answer => {
                info!(%vote_id, old = ?referendum.result, new = ?answer, "overwriting local answer with server result");
                referendum.result = answer;
            }
            Some(_) => {}
            None => warn!(%vote_id, "result for unknown client referendum, ignored"),
        }
    }
}

#[async_trait]
impl ApplicationDispatcher for ReferendumManager {
    async fn dispatch(&self, conv: Arc<Conversation>, msg: AppMessage) {
        match msg {
            AppMessage::Hello { back, .. } => {
                if !back {
                    conv.send_hello_response().await;
                }
            }
            AppMessage::Vote { broadcast, vote_id, question } => {
                let vote_id = VoteId::from_wire(vote_id);
                if broadcast {
                    self.handle_question(conv, vote_id, question).await;
                } else if let Err(e) = self.create_from_client_request(vote_id, question).await {
                    warn!(%vote_id, error = %e, "vote request rejected");
                }
            }
            AppMessage::Response { result, vote_id, answer } => {
                let vote_id = VoteId::from_wire(vote_id);
                if result {
                    self.handle_result(vote_id, answer).await;
                } else if let Err(e) = self.handle_response(conv.conv_id, vote_id, answer).await {
                    warn!(%vote_id, error = %e, "vote response rejected");
                }
            }
        }
    }
}
