use crate::{Method, Release};

pub const LOGIN_WITH_PASSWORD: Method = Method::new("session.login_with_password", Release::Rio);
pub const LOGOUT: Method = Method::new("session.logout", Release::Rio);
