//! Amazon Resource Name helpers.

use crate::endpoint::Service;

/// Build the ARN of `resource`.
///
/// S3 ARNs carry neither region nor account, IAM ARNs carry no region.
/// Regions starting with `cn-` use the `aws-cn` partition.
pub fn arn(service: Service, resource: &str, region: &str, account: &str) -> String {
    let partition = if region.starts_with("cn-") {
        "aws-cn"
    } else {
        "aws"
    };

    match service {
        Service::S3 => format!("arn:{partition}:s3:::{resource}"),
        Service::Iam => format!("arn:{partition}:iam::{account}:{resource}"),
        _ => format!("arn:{partition}:{service}:{region}:{account}:{resource}"),
    }
}

/// Region field of `arn`, or None if `arn` is not an ARN or has no region.
pub fn arn_region(arn: &str) -> Option<&str> {
    let mut fields = arn.splitn(6, ':');
    if fields.next()? != "arn" {
        return None;
    }

    // partition, service
    fields.nth(1)?;
    let region = fields.next()?;
    // account and resource must follow.
    fields.nth(1)?;

    (!region.is_empty()).then_some(region)
}
