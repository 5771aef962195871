//! Map a service and region to the host that serves it.

use crate::error::{ApiError, ErrorCode};
use std::fmt;
use std::str::FromStr;

/// Services the pipeline knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Simple Storage Service.
    S3,
    /// Simple Queue Service.
    Sqs,
    /// Simple Notification Service.
    Sns,
    /// SimpleDB.
    Sdb,
    /// Simple Email Service.
    Email,
    /// Security Token Service.
    Sts,
    /// Identity and Access Management.
    Iam,
    /// Lambda.
    Lambda,
    /// Elastic Compute Cloud.
    Ec2,
    /// DynamoDB.
    DynamoDb,
    /// CloudWatch.
    Monitoring,
    /// CloudWatch Logs.
    Logs,
    /// Key Management Service.
    Kms,
}

impl Service {
    /// Endpoint and signing name of this service.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::S3 => "s3",
            Service::Sqs => "sqs",
            Service::Sns => "sns",
            Service::Sdb => "sdb",
            Service::Email => "email",
            Service::Sts => "sts",
            Service::Iam => "iam",
            Service::Lambda => "lambda",
            Service::Ec2 => "ec2",
            Service::DynamoDb => "dynamodb",
            Service::Monitoring => "monitoring",
            Service::Logs => "logs",
            Service::Kms => "kms",
        }
    }

    /// Region used in the signing scope.
    ///
    /// Global services sign with `us-east-1` outside of China.
    pub fn signing_region<'a>(&self, region: &'a str) -> &'a str {
        match self {
            Service::Iam | Service::Sts if !is_china(region) => "us-east-1",
            _ => region,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "s3" => Service::S3,
            "sqs" => Service::Sqs,
            "sns" => Service::Sns,
            "sdb" => Service::Sdb,
            "email" | "ses" => Service::Email,
            "sts" => Service::Sts,
            "iam" => Service::Iam,
            "lambda" => Service::Lambda,
            "ec2" => Service::Ec2,
            "dynamodb" => Service::DynamoDb,
            "monitoring" | "cloudwatch" => Service::Monitoring,
            "logs" => Service::Logs,
            "kms" => Service::Kms,
            _ => {
                return Err(ApiError::configuration(
                    ErrorCode::UnknownService,
                    format!("unknown service: {s}"),
                ))
            }
        })
    }
}

/// A resolved service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Service addressed.
    pub service: Service,
    /// Region requested by the caller.
    pub region: String,
    /// Optional hostname prefix such as a bucket name.
    pub hostname_prefix: Option<String>,
    /// Host, without scheme.
    pub host: String,
}

impl Endpoint {
    /// Base URL of the endpoint, e.g. `https://sqs.eu-west-1.amazonaws.com`.
    pub fn url(&self) -> String {
        format!("https://{}", self.host)
    }
}

/// Resolve the endpoint of `service` in `region`.
///
/// This is a pure function of its arguments.
pub fn resolve(service: Service, region: &str, hostname_prefix: Option<&str>) -> Endpoint {
    let suffix = if is_china(region) {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    };

    let base = match service {
        Service::Iam => format!("iam.{suffix}"),
        Service::Sts if !is_china(region) => format!("sts.{suffix}"),
        Service::S3 | Service::Sdb if region == "us-east-1" => format!("{service}.{suffix}"),
        _ => format!("{service}.{region}.{suffix}"),
    };

    let host = match hostname_prefix.filter(|v| !v.is_empty()) {
        Some(prefix) => format!("{prefix}.{base}"),
        None => base,
    };

    Endpoint {
        service,
        region: region.to_string(),
        hostname_prefix: hostname_prefix.map(|v| v.to_string()),
        host,
    }
}

fn is_china(region: &str) -> bool {
    region.starts_with("cn-")
}
