use serde::Serialize;

use super::domain::{ConnectionRequest, RequestStatus, ViewerIdentities};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestBucket {
    Received,
    Sent,
    Active,
    History,
}

impl RequestBucket {
    pub const fn ordered() -> [Self; 4] {
        [Self::Received, Self::Sent, Self::Active, Self::History]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Received => "Received",
            Self::Sent => "Sent",
            Self::Active => "Active",
            Self::History => "History",
        }
    }
}

/// Persisted status decides first; the viewer's role only splits pending requests.
///
/// A pending request the viewer is not the requester of lands in `Received`.
pub fn bucket_for(request: &ConnectionRequest, viewer: &ViewerIdentities) -> RequestBucket {
    match request.status {
        RequestStatus::Accepted => RequestBucket::Active,
        RequestStatus::Rejected | RequestStatus::Withdrawn | RequestStatus::Cancelled => {
            RequestBucket::History
        }
        RequestStatus::Pending => {
            if viewer.owns(&request.recipient) || !viewer.owns(&request.requester) {
                RequestBucket::Received
            } else {
                RequestBucket::Sent
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategorizedRequests {
    pub received: Vec<ConnectionRequest>,
    pub sent: Vec<ConnectionRequest>,
    pub active: Vec<ConnectionRequest>,
    pub history: Vec<ConnectionRequest>,
}

impl CategorizedRequests {
    pub fn categorize(
        requests: impl IntoIterator<Item = ConnectionRequest>,
        viewer: &ViewerIdentities,
    ) -> Self {
        let mut categorized = Self::default();
        for request in requests {
            let bucket = bucket_for(&request, viewer);
            categorized.bucket_mut(bucket).push(request);
        }
        categorized
    }

    pub fn bucket(&self, bucket: RequestBucket) -> &[ConnectionRequest] {
        match bucket {
            RequestBucket::Received => &self.received,
            RequestBucket::Sent => &self.sent,
            RequestBucket::Active => &self.active,
            RequestBucket::History => &self.history,
        }
    }

    pub fn total(&self) -> usize {
        RequestBucket::ordered()
            .into_iter()
            .map(|bucket| self.bucket(bucket).len())
            .sum()
    }

    fn bucket_mut(&mut self, bucket: RequestBucket) -> &mut Vec<ConnectionRequest> {
        match bucket {
            RequestBucket::Received => &mut self.received,
            RequestBucket::Sent => &mut self.sent,
            RequestBucket::Active => &mut self.active,
            RequestBucket::History => &mut self.history,
        }
    }
}
