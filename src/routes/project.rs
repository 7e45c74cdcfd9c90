use actix_web::{get, post, put, web, HttpMessage, HttpRequest, HttpResponse};
use mongodb::bson::oid::ObjectId;
use std::str::FromStr;

use crate::{
    error::Error,
    models::{
        project::{
            Project, ProjectQuery, ProjectRequest, ProjectStageKind, ProjectStagePatch,
            ProjectUpdateRequest,
        },
        user::{User, UserAuthentication, UserRole},
    },
};

fn issuer(req: &HttpRequest) -> Result<UserAuthentication, Error> {
    match req.extensions().get::<UserAuthentication>() {
        Some(issuer) => Ok(issuer.clone()),
        None => Err(Error::authentication("Not authorized")),
    }
}
fn parse_id(_id: &str) -> Result<ObjectId, Error> {
    ObjectId::from_str(_id).map_err(|_| Error::validation("INVALID_ID"))
}
async fn find_response(_id: &ObjectId) -> Result<HttpResponse, Error> {
    let query: ProjectQuery = ProjectQuery {
        _id: Some(*_id),
        limit: None,
    };
    match Project::find_many(&query).await?.into_iter().next() {
        Some(project) => Ok(HttpResponse::Ok().json(project)),
        None => Err(Error::not_found("PROJECT_NOT_FOUND")),
    }
}
async fn validate_officer(_id: &ObjectId) -> Result<(), Error> {
    match User::find_by_id(_id).await? {
        Some(user) if user.role == UserRole::TechnicalOfficer => Ok(()),
        Some(_) => Err(Error::validation(
            "Assigned user is not a technical officer",
        )),
        None => Err(Error::not_found("TECHNICAL_OFFICER_NOT_FOUND")),
    }
}

#[get("/projects")]
pub async fn get_projects(req: HttpRequest) -> Result<HttpResponse, Error> {
    issuer(&req)?;

    let query: ProjectQuery = ProjectQuery {
        _id: None,
        limit: None,
    };

    let projects = Project::find_many(&query).await?;
    Ok(HttpResponse::Ok().json(projects))
}
#[get("/projects/stats/overview")]
pub async fn get_project_statistics(req: HttpRequest) -> Result<HttpResponse, Error> {
    issuer(&req)?;

    let statistics = Project::statistics().await?;
    Ok(HttpResponse::Ok().json(statistics))
}
#[get("/projects/{project_id}")]
pub async fn get_project(
    project_id: web::Path<String>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    issuer(&req)?;

    let project_id = parse_id(&project_id)?;
    find_response(&project_id).await
}
#[post("/projects")]
pub async fn create_project(
    payload: web::Json<ProjectRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let issuer = issuer(&req)?;
    if issuer.role != UserRole::TeamLeader {
        return Err(Error::authorization(
            "Only team leaders can create projects",
        ));
    }

    let payload: ProjectRequest = payload.into_inner();
    payload.validate()?;

    if let Some(officer) = &payload.assigned_technical_officer {
        validate_officer(officer).await?;
    }

    let mut project: Project = Project::new(payload, issuer._id);
    let project_id = project.save().await?;

    let query: ProjectQuery = ProjectQuery {
        _id: Some(project_id),
        limit: None,
    };
    match Project::find_many(&query).await?.into_iter().next() {
        Some(project) => Ok(HttpResponse::Created().json(project)),
        None => Err(Error::not_found("PROJECT_NOT_FOUND")),
    }
}
#[put("/projects/{project_id}")]
pub async fn update_project(
    project_id: web::Path<String>,
    payload: web::Json<ProjectUpdateRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let issuer = issuer(&req)?;
    let project_id = parse_id(&project_id)?;

    let mut project = match Project::find_by_id(&project_id).await? {
        Some(project) => project,
        None => return Err(Error::not_found("PROJECT_NOT_FOUND")),
    };

    let payload: ProjectUpdateRequest = payload.into_inner();
    if let Some(officer) = &payload.assigned_technical_officer {
        validate_officer(officer).await?;
    }

    project.apply_update(&payload, &issuer)?;
    project.update().await?;

    find_response(&project_id).await
}
#[put("/projects/{project_id}/stages/{stage}")]
pub async fn update_project_stage(
    path: web::Path<(String, String)>,
    payload: web::Json<ProjectStagePatch>,
    req: HttpRequest,
) -> Result<HttpResponse, Error> {
    let issuer = issuer(&req)?;
    let (project_id, stage) = path.into_inner();
    let project_id = parse_id(&project_id)?;
    let stage = match stage.as_str() {
        "clearance" => ProjectStageKind::Clearance,
        "installation" => ProjectStageKind::Installation,
        "connection" => ProjectStageKind::Connection,
        _ => return Err(Error::validation("INVALID_STAGE")),
    };

    let mut project = match Project::find_by_id(&project_id).await? {
        Some(project) => project,
        None => return Err(Error::not_found("PROJECT_NOT_FOUND")),
    };

    project.apply_stage_update(&stage, &payload.status, &issuer)?;
    project.update().await?;

    find_response(&project_id).await
}
