use actix_web::web::ServiceConfig;

mod health;
mod test_site;

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(health::health_route).service(test_site::test_site_route);
}
