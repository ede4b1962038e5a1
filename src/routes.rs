use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::{
    error::LedgerError,
    money::Amount,
    schemas::{Category, ExpenseDraft, Member, MemberId},
    service::LedgerService,
};

type Service = web::Data<LedgerService>;
type Response = Result<HttpResponse, LedgerError>;

#[derive(Deserialize, Serialize)]
pub struct NewGroupJson {
    pub name: String,
    #[serde(default)]
    pub category: Category,
    pub creator: Member,
}

#[derive(Deserialize, Serialize)]
pub struct SettlementJson {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Amount,
}

#[get("/groups")]
async fn list_groups(service: Service) -> Response {
    Ok(HttpResponse::Ok().json(service.list_groups().await?))
}

#[put("/groups/{id}")]
async fn add_group(service: Service, id: web::Path<String>, json: web::Json<NewGroupJson>) -> Response {
    let json = json.into_inner();
    let state = service
        .create_group(&id, &json.name, json.category, json.creator)
        .await?;
    Ok(HttpResponse::Created().json(state.group))
}

#[get("/groups/{id}")]
async fn get_group(service: Service, id: web::Path<String>) -> Response {
    Ok(HttpResponse::Ok().json(service.get_group(&id).await?))
}

#[post("/groups/{id}/members")]
async fn add_member(service: Service, id: web::Path<String>, member: web::Json<Member>) -> Response {
    let group = service.add_member(&id, member.into_inner()).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[delete("/groups/{id}/members/{member}")]
async fn remove_member(service: Service, path: web::Path<(String, String)>) -> Response {
    let (id, member) = path.into_inner();
    let group = service.remove_member(&id, &member).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/groups/{id}/expenses")]
async fn add_expense(service: Service, id: web::Path<String>, expense: web::Json<ExpenseDraft>) -> Response {
    let applied = service.record_expense(&id, expense.into_inner()).await?;
    Ok(HttpResponse::Created().json(applied))
}

#[get("/groups/{id}/expenses")]
async fn get_expenses(service: Service, id: web::Path<String>) -> Response {
    Ok(HttpResponse::Ok().json(service.get_expenses(&id).await?))
}

#[get("/groups/{id}/balances")]
async fn get_balances(service: Service, id: web::Path<String>) -> Response {
    Ok(HttpResponse::Ok().json(service.get_balances(&id).await?))
}

#[get("/groups/{id}/balance")]
async fn get_balance(service: Service, id: web::Path<String>) -> Response {
    Ok(HttpResponse::Ok().json(service.get_summary(&id).await?))
}

#[get("/groups/{id}/settlement")]
async fn get_settlement(service: Service, id: web::Path<String>) -> Response {
    Ok(HttpResponse::Ok().json(service.get_settlement_plan(&id).await?))
}

#[post("/groups/{id}/settlements")]
async fn settle(service: Service, id: web::Path<String>, json: web::Json<SettlementJson>) -> Response {
    let json = json.into_inner();
    let applied = service
        .record_settlement(&id, &json.from, &json.to, json.amount)
        .await?;
    Ok(HttpResponse::Created().json(applied))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_groups)
        .service(add_group)
        .service(get_group)
        .service(add_member)
        .service(remove_member)
        .service(add_expense)
        .service(get_expenses)
        .service(get_balances)
        .service(get_balance)
        .service(get_settlement)
        .service(settle);
}
