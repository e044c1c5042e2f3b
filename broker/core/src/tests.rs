use crate::{mem::*, AuthToken, SessionDuration, StoreError};
use chrono::Utc;
