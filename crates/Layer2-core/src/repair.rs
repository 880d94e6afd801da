//! Full-access repair sweep
//!
//! 모든 보호 엔티티는 full access 보유자를 최소 한 명 가져야 합니다.
//! 보유자가 없는 엔티티를 찾아 생성자에게 full access를 다시 부여합니다.
//! 누락된 레코드만 삽입하고 아무것도 삭제하지 않으므로 여러 번 실행해도
//! 결과가 같고, 일반 요청과 동시에 실행해도 됩니다.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use warden_foundation::{EntityRef, Error, Result, Storage};

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// Entities found without a full-access holder
    pub checked: usize,
    /// Entities whose creator received full access
    pub repaired: Vec<EntityRef>,
    /// Entities that gained a holder concurrently before the grant
    pub already_held: usize,
    pub finished_at: String,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty()
    }
}

/// Idempotent full-access sweep.
#[derive(Clone)]
pub struct RepairJob {
    storage: Arc<Storage>,
}

impl RepairJob {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn run(&self) -> Result<RepairReport> {
        let missing = self.storage.entities_missing_full_access()?;
        let mut report = RepairReport {
            checked: missing.len(),
            ..Default::default()
        };

        for entity in missing {
            let reference = entity.reference();
            let problem = Error::MissingFullAccessHolder(reference.to_string());
            warn!("{}", problem);

            if self
                .storage
                .grant_full_access_if_missing(&entity.created_by, &reference)?
            {
                info!("Granted full access on {} to creator {}", reference, entity.created_by);
                report.repaired.push(reference);
            } else {
                report.already_held += 1;
            }
        }

        report.finished_at = chrono::Utc::now().to_rfc3339();
        if report.is_clean() {
            info!("Repair sweep finished, nothing to do");
        } else {
            info!("Repair sweep finished, repaired {} entities", report.repaired.len());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_foundation::{EntityKind, NewEntity, PrivilegeRecord, Privileges, Tier, UserId};

    #[test]
    fn test_repair_is_idempotent() {
        let storage = Arc::new(Storage::in_memory().expect("Failed to create storage"));
        let creator = UserId::new("creator");
        let orphan = storage
            .insert_entity(&NewEntity::new(EntityKind::Resource, "microscope"), &creator)
            .unwrap();
        storage
            .insert_entity_with_owner(&NewEntity::new(EntityKind::Resource, "centrifuge"), &creator)
            .unwrap();

        let job = RepairJob::new(storage.clone());
        let first = job.run().unwrap();
        assert_eq!(first.checked, 1);
        assert_eq!(first.repaired, vec![orphan.reference()]);

        let holders_after_first = storage.full_access_holders(&orphan.reference()).unwrap();

        let second = job.run().unwrap();
        assert_eq!(second.checked, 0);
        assert!(second.is_clean());
        assert_eq!(
            storage.full_access_holders(&orphan.reference()).unwrap(),
            holders_after_first
        );
    }

    #[test]
    fn test_repair_upgrades_existing_creator_record() {
        let storage = Arc::new(Storage::in_memory().expect("Failed to create storage"));
        let creator = UserId::new("creator");
        let orphan = storage
            .insert_entity(&NewEntity::new(EntityKind::Contact, "lab partner"), &creator)
            .unwrap();
        storage
            .upsert_privilege(&PrivilegeRecord::new(
                creator.clone(),
                orphan.reference(),
                Privileges::neutral().allow(Tier::View),
            ))
            .unwrap();

        let report = RepairJob::new(storage.clone()).run().unwrap();
        assert_eq!(report.repaired.len(), 1);

        let record = storage
            .get_privilege(&creator, &orphan.reference())
            .unwrap()
            .unwrap();
        assert!(record.has_full_access());
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = RepairReport {
            checked: 1,
            repaired: vec![EntityRef::new(EntityKind::Dmp, "d1")],
            already_held: 0,
            finished_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["alreadyHeld"], 0);
        assert_eq!(json["repaired"][0]["kind"], "dmp");
    }
}
