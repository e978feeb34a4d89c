use super::{IPushGateway, PushDeliveryError, PushNotification};
use crate::config::VapidSettings;
use smart_notifier_domain::PushSubscription;
use tracing::error;
use web_push::{
    ContentEncoding, HyperWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

/// Web-push delivery with VAPID authentication. Without configured VAPID
/// keys every send reports `Unconfigured`, which callers treat as a
/// benign skip rather than a failure.
pub struct WebPushGateway {
    vapid: Option<VapidSettings>,
    client: HyperWebPushClient,
}

impl WebPushGateway {
    pub fn new(vapid: Option<VapidSettings>) -> Self {
        Self {
            vapid,
            client: HyperWebPushClient::new(),
        }
    }
}

fn is_gone(error: &WebPushError) -> bool {
    matches!(
        error,
        WebPushError::EndpointNotFound | WebPushError::EndpointNotValid
    )
}

#[async_trait::async_trait]
impl IPushGateway for WebPushGateway {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushNotification,
    ) -> Result<(), PushDeliveryError> {
        let vapid = match &self.vapid {
            Some(vapid) => vapid,
            None => return Err(PushDeliveryError::Unconfigured),
        };

        let subscription_info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh.clone(),
            subscription.auth.clone(),
        );

        let signature =
            VapidSignatureBuilder::from_base64(&vapid.private_key, URL_SAFE_NO_PAD, &subscription_info)
                .and_then(|mut builder| {
                    builder.add_claim("sub", vapid.subject.as_str());
                    builder.build()
                })
                .map_err(|e| {
                    error!("Unable to build VAPID signature. Error: {:?}", e);
                    PushDeliveryError::Transient(e.to_string())
                })?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| PushDeliveryError::Transient(e.to_string()))?;

        let mut builder = WebPushMessageBuilder::new(&subscription_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, &body);
        builder.set_vapid_signature(signature);
        let message = builder
            .build()
            .map_err(|e| PushDeliveryError::Transient(e.to_string()))?;

        match self.client.send(message).await {
            Ok(_) => Ok(()),
            Err(e) if is_gone(&e) => Err(PushDeliveryError::Gone),
            Err(e) => {
                error!(
                    "Push delivery to endpoint failed. Error message: {:?}",
                    e
                );
                Err(PushDeliveryError::Transient(e.to_string()))
            }
        }
    }
}
