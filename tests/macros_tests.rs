//! Tests for the `Request` and `Notification` derive macros

use std::any::TypeId;
use std::marker::PhantomData;

use brrtmediator::{DynNotification, DynRequest, Notification, Request, TypeKey};

#[derive(Request)]
struct Command;

#[derive(Request)]
#[request(response = Vec<String>)]
struct ListNames {
    _prefix: String,
}

#[derive(Request)]
#[request(response = Option<T>)]
struct Lookup<T: Send + Sync + 'static> {
    _key: u64,
    _marker: PhantomData<T>,
}

#[derive(Notification)]
struct OrderShipped {
    _order_id: u64,
}

fn response_of<R: Request>() -> TypeId {
    TypeId::of::<R::Response>()
}

#[test]
fn test_request_without_attribute_returns_unit() {
    assert_eq!(response_of::<Command>(), TypeId::of::<()>());
}

#[test]
fn test_request_response_attribute() {
    assert_eq!(response_of::<ListNames>(), TypeId::of::<Vec<String>>());

    let req = ListNames {
        _prefix: "a".to_string(),
    };
    let dyn_req: &dyn DynRequest = &req;
    assert_eq!(dyn_req.request_key(), TypeKey::of::<ListNames>());
    assert_eq!(dyn_req.response_key(), TypeKey::of::<Vec<String>>());
}

#[test]
fn test_generic_request() {
    assert_eq!(response_of::<Lookup<u8>>(), TypeId::of::<Option<u8>>());
    assert_ne!(TypeKey::of::<Lookup<u8>>(), TypeKey::of::<Lookup<u16>>());
}

#[test]
fn test_notification_derive() {
    let event = OrderShipped { _order_id: 9 };
    let dyn_event: &dyn DynNotification = &event;
    assert_eq!(dyn_event.notification_key(), TypeKey::of::<OrderShipped>());
}
