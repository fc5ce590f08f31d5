//! 测试辅助：捕获 tracing 事件

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, Mutex};

use rpcmw_bootstrap::{CallMetadata, RpcMessage};
use rpcmw_errors::{AppError, AppResult};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Default)]
pub struct Captured {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl Captured {
    /// 安装到当前线程，guard 释放前有效
    pub fn install() -> (Self, DefaultGuard) {
        let captured = Self::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (captured, guard)
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn at(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level == level)
            .collect()
    }
}

struct FieldVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut Vec<(String, String)>,
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            *self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for Captured {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        let mut fields = Vec::new();
        event.record(&mut FieldVisitor {
            message: &mut message,
            fields: &mut fields,
        });

        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

#[derive(Debug)]
pub struct GetUserReq {
    pub user_id: String,
}

#[derive(Debug)]
pub struct GetUserResp {
    pub nickname: String,
}

rpcmw_bootstrap::rpc_message!(GetUserReq, GetUserResp);

#[derive(Debug)]
pub struct CreateGroupReq {
    pub group_name: String,
}

impl RpcMessage for CreateGroupReq {
    fn validate(&self) -> AppResult<()> {
        if self.group_name.is_empty() {
            return Err(AppError::validation("group name is empty"));
        }
        Ok(())
    }
}

pub const CREATE_GROUP: &str = "/im.group.Group/CreateGroup";

pub const GET_USER: &str = "/im.user.User/GetUser";

pub fn metadata(pairs: &[(&str, &str)]) -> CallMetadata {
    pairs.iter().copied().collect()
}
