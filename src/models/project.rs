use crate::{database::get_db, error::Error, models::user::UserAuthenticationData};
use futures::stream::StreamExt;
use mongodb::{
    bson::{doc, from_bson, from_document, oid::ObjectId, to_bson, Bson, DateTime},
    Collection, Database,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectSystemKind {
    OnGrid,
    OffGrid,
    Hybrid,
}
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStageKind {
    Clearance,
    Installation,
    Connection,
}
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceStatusKind {
    PendingToApplyClearanceApplication,
    ClearanceApplied,
    ClearanceApproved,
    ClearanceRejected,
    CapacityReduced,
}
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatusKind {
    ClearanceReceived,
    SiteVisitCompleted,
    #[serde(rename = "60_percent_payment_received")]
    SixtyPercentPaymentReceived,
    OngoingInstallation,
    InstallationCompleted,
}
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatusKind {
    DocumentSubmission,
    EstimatePaid,
    ConnectionComplete,
    Procedure,
}
/// Derived summary of the furthest-progressed stage, recomputed on every
/// read and never stored.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatusKind {
    Clearance,
    Installation,
    Connection,
    Completed,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub project_number: String,
    pub name: String,
    pub location: String,
    pub system_type: ProjectSystemKind,
    pub size: f64,
    pub inverter: String,
    pub pv_panel: String,
    pub battery: Option<String>,
    pub assigned_technical_officer: Option<ObjectId>,
    pub clearance: ProjectClearance,
    pub installation: ProjectInstallation,
    pub connection: ProjectConnection,
    pub created_by: ObjectId,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClearance {
    pub status: ClearanceStatusKind,
    pub applied_date: Option<DateTime>,
    pub received_date: Option<DateTime>,
    pub updated_by: Option<ObjectId>,
    pub updated_at: DateTime,
}
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInstallation {
    pub status: InstallationStatusKind,
    pub completed_date: Option<DateTime>,
    pub updated_by: Option<ObjectId>,
    pub updated_at: DateTime,
}
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConnection {
    pub status: ConnectionStatusKind,
    pub completed_date: Option<DateTime>,
    pub updated_by: Option<ObjectId>,
    pub updated_at: DateTime,
}
#[derive(Debug)]
pub struct ProjectQuery {
    pub _id: Option<ObjectId>,
    pub limit: Option<usize>,
}
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    pub project_number: String,
    pub name: String,
    pub location: String,
    pub system_type: ProjectSystemKind,
    pub size: f64,
    pub inverter: String,
    pub pv_panel: String,
    pub battery: Option<String>,
    pub assigned_technical_officer: Option<ObjectId>,
}
/// Typed patch for the full-update path. `projectNumber` is immutable after
/// creation and `createdBy` is fixed, so neither appears here; stage changes
/// only travel as `{status}` patches so every one of them goes through
/// `Project::apply_stage_update`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdateRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub system_type: Option<ProjectSystemKind>,
    pub size: Option<f64>,
    pub inverter: Option<String>,
    pub pv_panel: Option<String>,
    pub battery: Option<String>,
    pub assigned_technical_officer: Option<ObjectId>,
    pub clearance: Option<ProjectStagePatch>,
    pub installation: Option<ProjectStagePatch>,
    pub connection: Option<ProjectStagePatch>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectStagePatch {
    pub status: String,
}
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResponse {
    #[serde(rename = "_id")]
    pub _id: String,
    pub project_number: String,
    pub name: String,
    pub location: String,
    pub system_type: ProjectSystemKind,
    pub size: f64,
    pub inverter: String,
    pub pv_panel: String,
    pub battery: Option<String>,
    pub assigned_technical_officer: Option<ProjectUserResponse>,
    pub clearance: ProjectClearance,
    pub installation: ProjectInstallation,
    pub connection: ProjectConnection,
    pub created_by: Option<ProjectUserResponse>,
    #[serde(default)]
    pub overall_status: Option<OverallStatusKind>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectUserResponse {
    pub _id: String,
    pub name: String,
    pub email: Option<String>,
}
#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectGroupCount {
    pub key: String,
    pub count: i32,
}
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatisticsResponse {
    pub total_projects: u64,
    pub projects_by_system_type: Vec<ProjectGroupCount>,
    pub clearance_stats: Vec<ProjectGroupCount>,
    pub installation_stats: Vec<ProjectGroupCount>,
    pub connection_stats: Vec<ProjectGroupCount>,
}

impl ProjectStageKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProjectStageKind::Clearance => "clearance",
            ProjectStageKind::Installation => "installation",
            ProjectStageKind::Connection => "connection",
        }
    }
}

impl ProjectClearance {
    fn new(now: DateTime) -> Self {
        Self {
            status: ClearanceStatusKind::PendingToApplyClearanceApplication,
            applied_date: None,
            received_date: None,
            updated_by: None,
            updated_at: now,
        }
    }
}
impl ProjectInstallation {
    fn new(now: DateTime) -> Self {
        Self {
            status: InstallationStatusKind::ClearanceReceived,
            completed_date: None,
            updated_by: None,
            updated_at: now,
        }
    }
}
impl ProjectConnection {
    fn new(now: DateTime) -> Self {
        Self {
            status: ConnectionStatusKind::DocumentSubmission,
            completed_date: None,
            updated_by: None,
            updated_at: now,
        }
    }
}

impl OverallStatusKind {
    /// Precedence matters: a complete connection wins over everything,
    /// then a completed installation, then an approved clearance.
    pub fn of(
        clearance: &ClearanceStatusKind,
        installation: &InstallationStatusKind,
        connection: &ConnectionStatusKind,
    ) -> Self {
        if *connection == ConnectionStatusKind::ConnectionComplete {
            OverallStatusKind::Completed
        } else if *installation == InstallationStatusKind::InstallationCompleted {
            OverallStatusKind::Connection
        } else if *clearance == ClearanceStatusKind::ClearanceApproved {
            OverallStatusKind::Installation
        } else {
            OverallStatusKind::Clearance
        }
    }
}

impl ProjectRequest {
    pub fn validate(&self) -> Result<(), Error> {
        let mut missing: Vec<&str> = Vec::new();
        if self.project_number.trim().is_empty() {
            missing.push("projectNumber");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.location.trim().is_empty() {
            missing.push("location");
        }
        if self.inverter.trim().is_empty() {
            missing.push("inverter");
        }
        if self.pv_panel.trim().is_empty() {
            missing.push("pvPanel");
        }
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        if !self.size.is_finite() || self.size < 0.0 {
            return Err(Error::validation("Size must be a non-negative number"));
        }
        Ok(())
    }
}

impl ProjectUpdateRequest {
    pub fn edits_project_fields(&self) -> bool {
        self.name.is_some()
            || self.location.is_some()
            || self.system_type.is_some()
            || self.size.is_some()
            || self.inverter.is_some()
            || self.pv_panel.is_some()
            || self.battery.is_some()
            || self.assigned_technical_officer.is_some()
    }
}

fn parse_status<T: DeserializeOwned>(status: &str, stage: &ProjectStageKind) -> Result<T, Error> {
    from_bson::<T>(Bson::String(status.to_string())).map_err(|_| {
        Error::validation(format!(
            "\"{}\" is not a valid {} status",
            status,
            stage.label()
        ))
    })
}

impl Project {
    pub fn new(request: ProjectRequest, created_by: ObjectId) -> Self {
        let now = DateTime::now();
        Self {
            _id: None,
            project_number: request.project_number,
            name: request.name,
            location: request.location,
            system_type: request.system_type,
            size: request.size,
            inverter: request.inverter,
            pv_panel: request.pv_panel,
            battery: request.battery,
            assigned_technical_officer: request.assigned_technical_officer,
            clearance: ProjectClearance::new(now),
            installation: ProjectInstallation::new(now),
            connection: ProjectConnection::new(now),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
    /// A later stage only opens once the one before it has reached its
    /// gate value. An installation that already left its default stays
    /// editable so a re-save of an advanced project never bounces.
    pub fn can_advance(&self, stage: &ProjectStageKind) -> bool {
        match stage {
            ProjectStageKind::Clearance => true,
            ProjectStageKind::Installation => {
                self.clearance.status == ClearanceStatusKind::ClearanceApproved
                    || self.installation.status != InstallationStatusKind::ClearanceReceived
            }
            ProjectStageKind::Connection => {
                self.installation.status == InstallationStatusKind::InstallationCompleted
            }
        }
    }
    pub fn overall_status(&self) -> OverallStatusKind {
        OverallStatusKind::of(
            &self.clearance.status,
            &self.installation.status,
            &self.connection.status,
        )
    }
    /// Single entry point for every stage change, whichever route it came
    /// in through. Checks run in order: stage gate, role permission, status
    /// vocabulary. Nothing is touched unless all of them pass. Milestone
    /// dates are set once and never overwritten by a later transition, so
    /// re-applying a status refreshes updatedBy/updatedAt only.
    pub fn apply_stage_update(
        &mut self,
        stage: &ProjectStageKind,
        status: &str,
        actor: &UserAuthenticationData,
    ) -> Result<(), Error> {
        match stage {
            ProjectStageKind::Installation if !self.can_advance(stage) => {
                return Err(Error::precondition(
                    "Cannot start installation until clearance is approved",
                ));
            }
            ProjectStageKind::Connection if !self.can_advance(stage) => {
                return Err(Error::precondition(
                    "Cannot start connection until installation is completed",
                ));
            }
            _ => (),
        }
        if !actor.role.can_edit_stage(stage) {
            return Err(Error::authorization(format!(
                "Access denied: your role cannot update the {} stage",
                stage.label()
            )));
        }

        let now = DateTime::now();
        match stage {
            ProjectStageKind::Clearance => {
                let status = parse_status::<ClearanceStatusKind>(status, stage)?;
                if status == ClearanceStatusKind::ClearanceApplied
                    && self.clearance.applied_date.is_none()
                {
                    self.clearance.applied_date = Some(now);
                }
                if status == ClearanceStatusKind::ClearanceApproved
                    && self.clearance.received_date.is_none()
                {
                    self.clearance.received_date = Some(now);
                }
                self.clearance.status = status;
                self.clearance.updated_by = Some(actor._id);
                self.clearance.updated_at = now;
            }
            ProjectStageKind::Installation => {
                let status = parse_status::<InstallationStatusKind>(status, stage)?;
                if status == InstallationStatusKind::InstallationCompleted
                    && self.installation.completed_date.is_none()
                {
                    self.installation.completed_date = Some(now);
                }
                self.installation.status = status;
                self.installation.updated_by = Some(actor._id);
                self.installation.updated_at = now;
            }
            ProjectStageKind::Connection => {
                let status = parse_status::<ConnectionStatusKind>(status, stage)?;
                if status == ConnectionStatusKind::ConnectionComplete
                    && self.connection.completed_date.is_none()
                {
                    self.connection.completed_date = Some(now);
                }
                self.connection.status = status;
                self.connection.updated_by = Some(actor._id);
                self.connection.updated_at = now;
            }
        }
        Ok(())
    }
    pub fn apply_update(
        &mut self,
        request: &ProjectUpdateRequest,
        actor: &UserAuthenticationData,
    ) -> Result<(), Error> {
        use crate::models::user::UserRole;

        if request.edits_project_fields() && actor.role != UserRole::TeamLeader {
            return Err(Error::authorization(
                "Only team leaders can update project details",
            ));
        }
        if let Some(name) = &request.name {
            if name.trim().is_empty() {
                return Err(Error::validation("Name must not be empty"));
            }
            self.name = name.clone();
        }
        if let Some(location) = &request.location {
            if location.trim().is_empty() {
                return Err(Error::validation("Location must not be empty"));
            }
            self.location = location.clone();
        }
        if let Some(system_type) = request.system_type {
            self.system_type = system_type;
        }
        if let Some(size) = request.size {
            if !size.is_finite() || size < 0.0 {
                return Err(Error::validation("Size must be a non-negative number"));
            }
            self.size = size;
        }
        if let Some(inverter) = &request.inverter {
            self.inverter = inverter.clone();
        }
        if let Some(pv_panel) = &request.pv_panel {
            self.pv_panel = pv_panel.clone();
        }
        if let Some(battery) = &request.battery {
            self.battery = Some(battery.clone());
        }
        if let Some(officer) = &request.assigned_technical_officer {
            self.assigned_technical_officer = Some(*officer);
        }
        if let Some(patch) = &request.clearance {
            self.apply_stage_update(&ProjectStageKind::Clearance, &patch.status, actor)?;
        }
        if let Some(patch) = &request.installation {
            self.apply_stage_update(&ProjectStageKind::Installation, &patch.status, actor)?;
        }
        if let Some(patch) = &request.connection {
            self.apply_stage_update(&ProjectStageKind::Connection, &patch.status, actor)?;
        }
        Ok(())
    }
    pub async fn save(&mut self) -> Result<ObjectId, Error> {
        let db: Database = get_db();
        let collection: Collection<Project> = db.collection::<Project>("projects");

        if Self::find_by_number(&self.project_number).await?.is_some() {
            return Err(Error::validation("Project number already exists"));
        }

        self._id = Some(ObjectId::new());

        collection
            .insert_one(&*self, None)
            .await
            .map_err(|_| Error::database("INSERTING_FAILED"))
            .map(|result| result.inserted_id.as_object_id().unwrap())
    }
    pub async fn update(&mut self) -> Result<ObjectId, Error> {
        let db: Database = get_db();
        let collection: Collection<Project> = db.collection::<Project>("projects");

        self.updated_at = DateTime::now();

        collection
            .update_one(
                doc! { "_id": self._id.unwrap() },
                doc! { "$set": to_bson::<Self>(self).unwrap() },
                None,
            )
            .await
            .map_err(|_| Error::database("UPDATE_FAILED"))
            .map(|_| self._id.unwrap())
    }
    pub async fn find_by_id(_id: &ObjectId) -> Result<Option<Project>, Error> {
        let db: Database = get_db();
        let collection: Collection<Project> = db.collection::<Project>("projects");

        collection
            .find_one(doc! { "_id": _id }, None)
            .await
            .map_err(|_| Error::database("FINDING_FAILED"))
    }
    pub async fn find_by_number(project_number: &str) -> Result<Option<Project>, Error> {
        let db: Database = get_db();
        let collection: Collection<Project> = db.collection::<Project>("projects");

        collection
            .find_one(doc! { "projectNumber": project_number }, None)
            .await
            .map_err(|_| Error::database("FINDING_FAILED"))
    }
    pub async fn find_many(query: &ProjectQuery) -> Result<Vec<ProjectResponse>, Error> {
        let db: Database = get_db();
        let collection: Collection<Project> = db.collection::<Project>("projects");

        let mut pipeline: Vec<mongodb::bson::Document> = Vec::new();
        let mut projects: Vec<ProjectResponse> = Vec::new();

        if let Some(_id) = &query._id {
            pipeline.push(doc! {
                "$match": { "_id": _id }
            });
        }

        pipeline.push(doc! {
            "$sort": { "createdAt": -1 }
        });

        if let Some(limit) = query.limit {
            pipeline.push(doc! {
                "$limit": to_bson::<usize>(&limit).unwrap()
            });
        }

        pipeline.push(doc! {
            "$lookup": {
                "from": "users",
                "localField": "assignedTechnicalOfficer",
                "foreignField": "_id",
                "as": "assignedTechnicalOfficer",
            }
        });
        pipeline.push(doc! {
            "$unwind": {
                "path": "$assignedTechnicalOfficer",
                "preserveNullAndEmptyArrays": true,
            }
        });
        pipeline.push(doc! {
            "$lookup": {
                "from": "users",
                "localField": "createdBy",
                "foreignField": "_id",
                "as": "createdBy",
            }
        });
        pipeline.push(doc! {
            "$unwind": {
                "path": "$createdBy",
                "preserveNullAndEmptyArrays": true,
            }
        });
        pipeline.push(doc! {
            "$project": {
                "_id": { "$toString": "$_id" },
                "projectNumber": "$projectNumber",
                "name": "$name",
                "location": "$location",
                "systemType": "$systemType",
                "size": "$size",
                "inverter": "$inverter",
                "pvPanel": "$pvPanel",
                "battery": "$battery",
                "assignedTechnicalOfficer": {
                    "$cond": [
                        "$assignedTechnicalOfficer",
                        {
                            "_id": { "$toString": "$assignedTechnicalOfficer._id" },
                            "name": "$assignedTechnicalOfficer.name",
                            "email": "$assignedTechnicalOfficer.email",
                        },
                        to_bson::<Option<ProjectUserResponse>>(&None).unwrap()
                    ]
                },
                "createdBy": {
                    "$cond": [
                        "$createdBy",
                        {
                            "_id": { "$toString": "$createdBy._id" },
                            "name": "$createdBy.name",
                        },
                        to_bson::<Option<ProjectUserResponse>>(&None).unwrap()
                    ]
                },
                "clearance": "$clearance",
                "installation": "$installation",
                "connection": "$connection",
                "createdAt": "$createdAt",
                "updatedAt": "$updatedAt",
            }
        });

        if let Ok(mut cursor) = collection.aggregate(pipeline, None).await {
            while let Some(Ok(doc)) = cursor.next().await {
                let mut project: ProjectResponse = from_document::<ProjectResponse>(doc).unwrap();
                project.overall_status = Some(OverallStatusKind::of(
                    &project.clearance.status,
                    &project.installation.status,
                    &project.connection.status,
                ));
                projects.push(project);
            }
            Ok(projects)
        } else {
            Err(Error::database("AGGREGATION_FAILED"))
        }
    }
    pub async fn statistics() -> Result<ProjectStatisticsResponse, Error> {
        let db: Database = get_db();
        let collection: Collection<Project> = db.collection::<Project>("projects");

        let total_projects = collection
            .count_documents(doc! {}, None)
            .await
            .map_err(|_| Error::database("COUNTING_FAILED"))?;

        Ok(ProjectStatisticsResponse {
            total_projects,
            projects_by_system_type: Self::count_by_group("systemType").await?,
            clearance_stats: Self::count_by_group("clearance.status").await?,
            installation_stats: Self::count_by_group("installation.status").await?,
            connection_stats: Self::count_by_group("connection.status").await?,
        })
    }
    async fn count_by_group(field: &str) -> Result<Vec<ProjectGroupCount>, Error> {
        let db: Database = get_db();
        let collection: Collection<Project> = db.collection::<Project>("projects");

        let pipeline: Vec<mongodb::bson::Document> = vec![
            doc! {
                "$group": { "_id": format!("${field}"), "count": { "$sum": 1 } }
            },
            doc! {
                "$project": { "_id": 0, "key": { "$toString": "$_id" }, "count": "$count" }
            },
        ];

        let mut groups: Vec<ProjectGroupCount> = Vec::new();
        if let Ok(mut cursor) = collection.aggregate(pipeline, None).await {
            while let Some(Ok(doc)) = cursor.next().await {
                let group: ProjectGroupCount = from_document::<ProjectGroupCount>(doc).unwrap();
                groups.push(group);
            }
            Ok(groups)
        } else {
            Err(Error::database("AGGREGATION_FAILED"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{UserAuthenticationData, UserRole};

    fn actor(role: UserRole) -> UserAuthenticationData {
        UserAuthenticationData {
            _id: ObjectId::new(),
            role,
            token: String::new(),
        }
    }
    fn sample_request() -> ProjectRequest {
        ProjectRequest {
            project_number: "SP-001".to_string(),
            name: "Rooftop array".to_string(),
            location: "Colombo".to_string(),
            system_type: ProjectSystemKind::OnGrid,
            size: 5.5,
            inverter: "X".to_string(),
            pv_panel: "Y".to_string(),
            battery: None,
            assigned_technical_officer: None,
        }
    }
    fn sample_project() -> Project {
        Project::new(sample_request(), ObjectId::new())
    }

    #[test]
    fn new_project_starts_at_stage_defaults() {
        let project = sample_project();
        assert_eq!(
            project.clearance.status,
            ClearanceStatusKind::PendingToApplyClearanceApplication
        );
        assert_eq!(
            project.installation.status,
            InstallationStatusKind::ClearanceReceived
        );
        assert_eq!(
            project.connection.status,
            ConnectionStatusKind::DocumentSubmission
        );
        assert!(project.clearance.applied_date.is_none());
        assert!(project.clearance.received_date.is_none());
        assert!(project.installation.completed_date.is_none());
        assert!(project.connection.completed_date.is_none());
        assert_eq!(project.overall_status(), OverallStatusKind::Clearance);
    }

    #[test]
    fn clearance_rejects_technical_officer() {
        let mut project = sample_project();
        let result = project.apply_stage_update(
            &ProjectStageKind::Clearance,
            "clearance_applied",
            &actor(UserRole::TechnicalOfficer),
        );
        assert!(matches!(result, Err(Error::Authorization(_))));
        assert_eq!(
            project.clearance.status,
            ClearanceStatusKind::PendingToApplyClearanceApplication
        );
        assert!(project.clearance.updated_by.is_none());
    }

    #[test]
    fn installation_gated_until_clearance_approved() {
        let mut project = sample_project();
        let result = project.apply_stage_update(
            &ProjectStageKind::Installation,
            "ongoing_installation",
            &actor(UserRole::TechnicalOfficer),
        );
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert_eq!(
            project.installation.status,
            InstallationStatusKind::ClearanceReceived
        );
        assert!(project.installation.updated_by.is_none());
    }

    #[test]
    fn gate_outranks_permission_for_assistants() {
        // The dependency message wins even for a role that could never
        // touch installation.
        let mut project = sample_project();
        project.clearance.status = ClearanceStatusKind::ClearanceApplied;
        let result = project.apply_stage_update(
            &ProjectStageKind::Installation,
            "site_visit_completed",
            &actor(UserRole::Assistant),
        );
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert_eq!(
            project.installation.status,
            InstallationStatusKind::ClearanceReceived
        );
    }

    #[test]
    fn ungated_installation_still_rejects_assistants() {
        let mut project = sample_project();
        project.clearance.status = ClearanceStatusKind::ClearanceApproved;
        let result = project.apply_stage_update(
            &ProjectStageKind::Installation,
            "site_visit_completed",
            &actor(UserRole::Assistant),
        );
        assert!(matches!(result, Err(Error::Authorization(_))));
    }

    #[test]
    fn installation_opens_after_clearance_approved() {
        let mut project = sample_project();
        project
            .apply_stage_update(
                &ProjectStageKind::Clearance,
                "clearance_approved",
                &actor(UserRole::TeamLeader),
            )
            .unwrap();
        let officer = actor(UserRole::TechnicalOfficer);
        project
            .apply_stage_update(&ProjectStageKind::Installation, "ongoing_installation", &officer)
            .unwrap();
        assert_eq!(
            project.installation.status,
            InstallationStatusKind::OngoingInstallation
        );
        assert_eq!(project.installation.updated_by, Some(officer._id));
    }

    #[test]
    fn advanced_installation_stays_editable_without_approval() {
        let mut project = sample_project();
        project.installation.status = InstallationStatusKind::SiteVisitCompleted;
        assert!(project.can_advance(&ProjectStageKind::Installation));
        let result = project.apply_stage_update(
            &ProjectStageKind::Installation,
            "60_percent_payment_received",
            &actor(UserRole::TeamLeader),
        );
        assert!(result.is_ok());
        assert_eq!(
            project.installation.status,
            InstallationStatusKind::SixtyPercentPaymentReceived
        );
    }

    #[test]
    fn connection_gated_until_installation_completed() {
        let mut project = sample_project();
        project.clearance.status = ClearanceStatusKind::ClearanceApproved;
        project.installation.status = InstallationStatusKind::OngoingInstallation;
        let result = project.apply_stage_update(
            &ProjectStageKind::Connection,
            "estimate_paid",
            &actor(UserRole::Assistant),
        );
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert_eq!(
            project.connection.status,
            ConnectionStatusKind::DocumentSubmission
        );
    }

    #[test]
    fn applied_date_is_set_once() {
        let mut project = sample_project();
        let leader = actor(UserRole::TeamLeader);
        let sentinel = DateTime::from_millis(0);
        project.clearance.applied_date = Some(sentinel);
        project
            .apply_stage_update(&ProjectStageKind::Clearance, "clearance_applied", &leader)
            .unwrap();
        assert_eq!(project.clearance.applied_date, Some(sentinel));
        assert_eq!(project.clearance.updated_by, Some(leader._id));
    }

    #[test]
    fn approval_sets_received_date_and_leaves_applied_date() {
        let mut project = sample_project();
        project
            .apply_stage_update(
                &ProjectStageKind::Clearance,
                "clearance_approved",
                &actor(UserRole::Assistant),
            )
            .unwrap();
        assert_eq!(project.clearance.status, ClearanceStatusKind::ClearanceApproved);
        assert!(project.clearance.received_date.is_some());
        assert!(project.clearance.applied_date.is_none());
    }

    #[test]
    fn completed_dates_are_set_once() {
        let mut project = sample_project();
        project.clearance.status = ClearanceStatusKind::ClearanceApproved;
        let officer = actor(UserRole::TechnicalOfficer);
        project
            .apply_stage_update(
                &ProjectStageKind::Installation,
                "installation_completed",
                &officer,
            )
            .unwrap();
        let first = project.installation.completed_date;
        assert!(first.is_some());
        project
            .apply_stage_update(
                &ProjectStageKind::Installation,
                "installation_completed",
                &officer,
            )
            .unwrap();
        assert_eq!(project.installation.completed_date, first);
    }

    #[test]
    fn invalid_status_token_is_rejected() {
        let mut project = sample_project();
        let result = project.apply_stage_update(
            &ProjectStageKind::Clearance,
            "installation_completed",
            &actor(UserRole::TeamLeader),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(
            project.clearance.status,
            ClearanceStatusKind::PendingToApplyClearanceApplication
        );
    }

    #[test]
    fn overall_status_follows_precedence() {
        let mut project = sample_project();
        assert_eq!(project.overall_status(), OverallStatusKind::Clearance);

        project.clearance.status = ClearanceStatusKind::ClearanceApproved;
        assert_eq!(project.overall_status(), OverallStatusKind::Installation);

        project.installation.status = InstallationStatusKind::InstallationCompleted;
        assert_eq!(project.overall_status(), OverallStatusKind::Connection);

        project.connection.status = ConnectionStatusKind::ConnectionComplete;
        assert_eq!(project.overall_status(), OverallStatusKind::Completed);
    }

    #[test]
    fn connection_complete_dominates_other_stages() {
        let mut project = sample_project();
        project.connection.status = ConnectionStatusKind::ConnectionComplete;
        assert_eq!(project.overall_status(), OverallStatusKind::Completed);
    }

    #[test]
    fn full_project_lifecycle() {
        let mut project = sample_project();
        project
            .apply_stage_update(
                &ProjectStageKind::Clearance,
                "clearance_approved",
                &actor(UserRole::TeamLeader),
            )
            .unwrap();
        assert!(project.clearance.received_date.is_some());
        assert!(project.clearance.applied_date.is_none());

        project
            .apply_stage_update(
                &ProjectStageKind::Installation,
                "installation_completed",
                &actor(UserRole::TechnicalOfficer),
            )
            .unwrap();
        assert!(project.installation.completed_date.is_some());

        project
            .apply_stage_update(
                &ProjectStageKind::Connection,
                "connection_complete",
                &actor(UserRole::Assistant),
            )
            .unwrap();
        assert!(project.connection.completed_date.is_some());
        assert_eq!(project.overall_status(), OverallStatusKind::Completed);
    }

    #[test]
    fn basic_fields_require_team_leader() {
        let mut project = sample_project();
        let request = ProjectUpdateRequest {
            name: Some("Renamed".to_string()),
            location: None,
            system_type: None,
            size: None,
            inverter: None,
            pv_panel: None,
            battery: None,
            assigned_technical_officer: None,
            clearance: None,
            installation: None,
            connection: None,
        };
        let result = project.apply_update(&request, &actor(UserRole::Assistant));
        assert!(matches!(result, Err(Error::Authorization(_))));
        assert_eq!(project.name, "Rooftop array");

        project
            .apply_update(&request, &actor(UserRole::TeamLeader))
            .unwrap();
        assert_eq!(project.name, "Renamed");
    }

    #[test]
    fn full_update_path_enforces_stage_gate() {
        let mut project = sample_project();
        let request = ProjectUpdateRequest {
            name: None,
            location: None,
            system_type: None,
            size: None,
            inverter: None,
            pv_panel: None,
            battery: None,
            assigned_technical_officer: None,
            clearance: None,
            installation: Some(ProjectStagePatch {
                status: "ongoing_installation".to_string(),
            }),
            connection: None,
        };
        let result = project.apply_update(&request, &actor(UserRole::TeamLeader));
        assert!(matches!(result, Err(Error::Precondition(_))));
        assert_eq!(
            project.installation.status,
            InstallationStatusKind::ClearanceReceived
        );
    }

    #[test]
    fn create_request_lists_missing_fields() {
        let request = ProjectRequest {
            project_number: String::new(),
            name: String::new(),
            location: "Kandy".to_string(),
            system_type: ProjectSystemKind::Hybrid,
            size: 3.0,
            inverter: "Z".to_string(),
            pv_panel: "W".to_string(),
            battery: None,
            assigned_technical_officer: None,
        };
        match request.validate() {
            Err(Error::Validation(message)) => {
                assert!(message.contains("projectNumber"));
                assert!(message.contains("name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn create_request_rejects_negative_size() {
        let mut request = sample_request();
        request.size = -1.0;
        assert!(matches!(request.validate(), Err(Error::Validation(_))));
    }
}
