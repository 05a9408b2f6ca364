/**
 * REQUEST REGISTRY - Origination des demandes de consultation
 *
 * RÔLE : Création des demandes côté hub, attribution des ids, suivi du
 * cycle de vie (pending -> accepted -> completed) et republication vers
 * l'unité de bureau concernée.
 *
 * FONCTIONNEMENT : Store mémoire (la persistance du dossier de
 * consultation appartient à la couche applicative). Chaque création ou
 * changement de statut publie la demande complète en at-least-once : le
 * desk applique en update-in-place par id, donc les doublons sont inoffensifs.
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use deskline_core::messages::{self, ConsultationRequest, RequestStatus};
use deskline_core::transport::{DeliveryMode, Publisher};
use deskline_core::{new_state, Shared, TransportError};
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize)]
pub struct StoredRequest {
    pub endpoint_id: u32,
    #[serde(flatten)]
    pub request: ConsultationRequest,
}

pub struct RequestRegistry<P: Publisher> {
    requests: Shared<HashMap<u64, StoredRequest>>,
    next_id: AtomicU64,
    publisher: P,
}

impl<P: Publisher> RequestRegistry<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            requests: new_state(HashMap::new()),
            next_id: AtomicU64::new(1),
            publisher,
        }
    }

    /// Crée une demande, l'enregistre puis la publie vers le desk. Un échec
    /// de publication est signalé mais la demande reste enregistrée : le
    /// prochain changement de statut la republiera.
    pub async fn create(
        &self,
        endpoint_id: u32,
        requester_name: String,
        details: String,
        course_code: Option<String>,
    ) -> ConsultationRequest {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = ConsultationRequest {
            id,
            requester_name,
            details,
            course_code,
            requested_at: OffsetDateTime::now_utc(),
            status: RequestStatus::Pending,
        };
        self.requests.lock().insert(
            id,
            StoredRequest {
                endpoint_id,
                request: request.clone(),
            },
        );
        println!("[hub] created consultation request {id} for desk {endpoint_id}");

        if let Err(e) = self.publish(endpoint_id, &request).await {
            eprintln!("[hub] failed to publish request {id}: {e}");
        }
        request
    }

    /// Change le statut et republie la demande complète vers son desk.
    pub async fn set_status(&self, id: u64, status: RequestStatus) -> Option<ConsultationRequest> {
        let (endpoint_id, request) = {
            let mut requests = self.requests.lock();
            let stored = requests.get_mut(&id)?;
            stored.request.status = status;
            (stored.endpoint_id, stored.request.clone())
        };
        println!("[hub] request {id} -> {status}");

        if let Err(e) = self.publish(endpoint_id, &request).await {
            eprintln!("[hub] failed to publish request {id} update: {e}");
        }
        Some(request)
    }

    pub fn get(&self, id: u64) -> Option<StoredRequest> {
        self.requests.lock().get(&id).cloned()
    }

    /// Liste les demandes, les plus récentes d'abord, filtrables par desk.
    pub fn list(&self, endpoint_id: Option<u32>) -> Vec<StoredRequest> {
        let mut list: Vec<StoredRequest> = self
            .requests
            .lock()
            .values()
            .filter(|s| endpoint_id.map_or(true, |e| s.endpoint_id == e))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.request.requested_at.cmp(&a.request.requested_at));
        list
    }

    /// Demandes non terminées, pour le rapport de santé.
    pub fn open_count(&self) -> usize {
        self.requests
            .lock()
            .values()
            .filter(|s| s.request.status != RequestStatus::Completed)
            .count()
    }

    async fn publish(
        &self,
        endpoint_id: u32,
        request: &ConsultationRequest,
    ) -> Result<(), TransportError> {
        let topic = messages::requests_topic(endpoint_id);
        let payload = serde_json::to_vec(request).map_err(|e| TransportError::Publish {
            topic: topic.clone(),
            reason: e.to_string(),
        })?;
        // La perte d'une demande est inacceptable : at-least-once, et le
        // desk résout les doublons par id.
        self.publisher
            .publish(&topic, payload, DeliveryMode::AtLeastOnce)
            .await
    }
}
