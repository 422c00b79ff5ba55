use super::*;
use crate::components::{encryption, storage};
use crate::error::DzRegError;
use crate::iam::Effect;
use proptest::prelude::*;

const TEST_BUCKET: &str = "datazone-datazone-test-datasource-991651053978-eu-west-1";

struct Fixture {
    graph: ResourceGraph,
    env: Environment,
    qualifier: ApplicationQualifier,
    key: LogicalId,
    bucket: LogicalId,
}

fn fixture() -> Fixture {
    let mut graph = ResourceGraph::new();
    let env = Environment::new("991651053978", "eu-west-1");
    let keys = encryption::provision(&mut graph, &env).unwrap();
    let bucket = storage::declare_secure_bucket(
        &mut graph,
        Component::Root,
        LogicalId::new("DatazoneTestDataSourceBucket").unwrap(),
        TEST_BUCKET,
        keys.key_arn(),
        &env,
    )
    .unwrap();
    Fixture {
        graph,
        env,
        qualifier: ApplicationQualifier::new("datazone").unwrap(),
        key: keys.key,
        bucket,
    }
}

fn owned(fixture: &Fixture, name: &str, registration: bool) -> DatasetDescriptor {
    DatasetDescriptor {
        name: name.to_string(),
        bucket: BucketOwnership::Owned(OwnedBucket {
            bucket: fixture.bucket.clone(),
            key: Some(fixture.key.clone()),
        }),
        bucket_name: TEST_BUCKET.to_string(),
        key_prefix: String::new(),
        key_arn: Expr::arn_of(&fixture.key),
        registration,
        schedule: "cron(0 1 * * ? *)".to_string(),
    }
}

fn external(name: &str) -> DatasetDescriptor {
    DatasetDescriptor {
        name: name.to_string(),
        bucket: BucketOwnership::External,
        bucket_name: "sales-landing".to_string(),
        key_prefix: "exports/".to_string(),
        key_arn: Expr::literal("arn:aws:kms:eu-west-1:111122223333:key/abcd"),
        registration: true,
        schedule: "cron(0 2 * * ? *)".to_string(),
    }
}

fn run(fixture: &mut Fixture, datasets: &[DatasetDescriptor]) -> Result<ProcessingOutputs> {
    let key_arn = Expr::arn_of(&fixture.key);
    provision(
        &mut fixture.graph,
        &fixture.env,
        &fixture.qualifier,
        &key_arn,
        datasets,
    )
}

fn resource<'a>(graph: &'a ResourceGraph, id: &LogicalId) -> &'a Resource {
    &graph.get(id).expect("declared node").resource
}

#[test]
fn test_testdata_scenario() {
    let mut fixture = fixture();
    let datasets = [owned(&fixture, "testdata", true)];
    let outputs = run(&mut fixture, &datasets).unwrap();
    let graph = &fixture.graph;
    let testdata = outputs.dataset("testdata").unwrap();

    let Resource::GlueDatabase(database) = resource(graph, &testdata.database) else {
        panic!("database expected");
    };
    assert_eq!(database.name, "datazone-testdata-db");
    assert_eq!(database.location_uri, format!("s3://{}/", TEST_BUCKET));

    let Resource::Crawler(crawler) = resource(graph, &testdata.crawler) else {
        panic!("crawler expected");
    };
    assert_eq!(crawler.name, "datazone-testdata-data-crawler");
    assert_eq!(crawler.table_prefix, "datazone-testdata-");
    assert_eq!(crawler.tags[REGISTRATION_TAG], "true");
    assert_eq!(
        crawler.security_configuration,
        Expr::reference(&outputs.security_configuration)
    );

    let Resource::Role(role) = resource(graph, &testdata.crawler_role) else {
        panic!("role expected");
    };
    assert_eq!(role.name, "AWSGlueCrawlerRole-datazone-testdata");
    assert_eq!(
        role.managed_policy_arns,
        vec!["arn:aws:iam::aws:policy/service-role/AWSGlueServiceRole"]
    );

    let ordering = graph.ordering_dependencies_of(&testdata.table_grant);
    assert_eq!(ordering.len(), 3);
    assert!(ordering.contains(&testdata.crawler));
    assert!(ordering.contains(&testdata.crawler_role));
    assert!(ordering.contains(&testdata.database));
}

#[test]
fn test_registration_flag_is_string_tag() {
    let mut fixture = fixture();
    let datasets = [owned(&fixture, "testdata", false)];
    let outputs = run(&mut fixture, &datasets).unwrap();

    let crawler_id = &outputs.datasets[0].crawler;
    let Resource::Crawler(crawler) = resource(&fixture.graph, crawler_id) else {
        panic!("crawler expected");
    };
    assert_eq!(crawler.tags[REGISTRATION_TAG], "false".to_string());
}

#[test]
fn test_grant_ordering_edges() {
    let mut fixture = fixture();
    let datasets = [owned(&fixture, "testdata", true)];
    let outputs = run(&mut fixture, &datasets).unwrap();
    let graph = &fixture.graph;
    let testdata = &outputs.datasets[0];

    assert!(graph.has_ordering_edge(&testdata.crawler, &testdata.crawler_role));
    assert!(graph.has_ordering_edge(&testdata.database_grant, &testdata.database));

    let Resource::Permissions(db_grant) = resource(graph, &testdata.database_grant) else {
        panic!("grant expected");
    };
    assert_eq!(db_grant.permissions, DATABASE_PERMISSIONS.to_vec());
    assert!(matches!(db_grant.scope, LakeScope::Database { ref name, .. } if name == "datazone-testdata-db"));

    let Resource::Permissions(table_grant) = resource(graph, &testdata.table_grant) else {
        panic!("grant expected");
    };
    assert_eq!(table_grant.permissions, TABLE_PERMISSIONS.to_vec());
    assert!(matches!(table_grant.scope, LakeScope::TableWildcard { .. }));

    let order: Vec<&LogicalId> = graph
        .deployment_order()
        .unwrap()
        .into_iter()
        .map(|node| &node.id)
        .collect();
    let position = |id: &LogicalId| order.iter().position(|o| *o == id).unwrap();
    assert!(position(&testdata.table_grant) > position(&testdata.crawler));
    assert!(position(&testdata.table_grant) > position(&testdata.database));
    assert!(position(&testdata.crawler) > position(&testdata.crawler_role));
}

#[test]
fn test_owned_bucket_gets_two_reader_statements() {
    let mut fixture = fixture();
    let datasets = [owned(&fixture, "testdata", true)];
    let outputs = run(&mut fixture, &datasets).unwrap();
    let graph = &fixture.graph;
    let testdata = &outputs.datasets[0];

    let key_id = testdata.key_attachment.as_ref().expect("key statement");
    let Resource::PolicyAttachment(key_statement) = resource(graph, key_id) else {
        panic!("attachment expected");
    };
    assert_eq!(key_statement.target, fixture.key);
    assert_eq!(key_statement.statement.sid.as_deref(), Some("AllowDatazoneRolesTestdata"));
    assert!(key_statement.statement.covers_action("kms:DescribeKey"));
    assert!(key_statement.statement.covers_action("kms:GetKeyPolicy"));
    assert!(!key_statement.statement.covers_action("kms:Encrypt"));
    assert_eq!(
        key_statement.statement.conditions["StringLike"]["aws:PrincipalArn"],
        vec![
            "arn:aws:iam::991651053978:role/aws-service-role/lakeformation.amazonaws.com/AWSServiceRoleForLakeFormationDataAccess".to_string(),
            "arn:aws:iam::991651053978:role/datazone_*".to_string(),
            "arn:aws:iam::991651053978:role/dz-dataset-registration-lambda-role".to_string(),
        ]
    );

    let bucket_id = testdata.bucket_attachment.as_ref().expect("bucket statement");
    let Resource::PolicyAttachment(bucket_statement) = resource(graph, bucket_id) else {
        panic!("attachment expected");
    };
    assert_eq!(bucket_statement.target, fixture.bucket);
    assert!(bucket_statement.statement.has_any_principal());
    assert_eq!(bucket_statement.statement.resources.len(), 2);
    assert!(bucket_statement.statement.covers_action("s3:GetObject"));
    assert!(bucket_statement.statement.covers_action("s3:ListBucket"));
    assert!(!bucket_statement.statement.covers_action("s3:PutObject"));
}

#[test]
fn test_owned_bucket_without_key_gets_bucket_statement_only() {
    let mut fixture = fixture();
    let mut dataset = owned(&fixture, "testdata", true);
    dataset.bucket = BucketOwnership::Owned(OwnedBucket {
        bucket: fixture.bucket.clone(),
        key: None,
    });
    let outputs = run(&mut fixture, &[dataset]).unwrap();

    assert!(outputs.datasets[0].key_attachment.is_none());
    assert!(outputs.datasets[0].bucket_attachment.is_some());
}

#[test]
fn test_external_bucket_gets_no_statements() {
    let mut fixture = fixture();
    let outputs = run(&mut fixture, &[external("sales")]).unwrap();
    let sales = &outputs.datasets[0];

    assert!(sales.key_attachment.is_none());
    assert!(sales.bucket_attachment.is_none());
    assert!(
        !fixture
            .graph
            .nodes()
            .any(|node| matches!(node.resource, Resource::PolicyAttachment(_)))
    );

    let Resource::GlueDatabase(database) = resource(&fixture.graph, &sales.database) else {
        panic!("database expected");
    };
    assert_eq!(database.location_uri, "s3://sales-landing/exports/");
}

#[test]
fn test_crawler_policy_never_drops_databases() {
    let mut fixture = fixture();
    let datasets = [owned(&fixture, "testdata", true), external("sales")];
    let outputs = run(&mut fixture, &datasets).unwrap();

    for dataset in &outputs.datasets {
        let Resource::Role(role) = resource(&fixture.graph, &dataset.crawler_role) else {
            panic!("role expected");
        };
        let policy = &role.inline_policies["GlueCrawlerPolicy"];
        assert!(!policy.allows_action("glue:DeleteDatabase"));
        assert!(!policy.allows_action("glue:UpdateDatabase"));
        assert!(policy.allows_action("glue:CreateTable"));
        assert!(policy.allows_action("glue:BatchCreatePartition"));
        assert!(policy.statements().iter().all(|s| s.effect == Effect::Allow));
    }
}

#[test]
fn test_crawler_policy_scopes_key_and_log_stream() {
    let env = Environment::new("991651053978", "eu-west-1");
    let qualifier = ApplicationQualifier::new("datazone").unwrap();
    let names = DatasetNames::derive(&qualifier, "sales");
    let key = Expr::literal("arn:aws:kms:eu-west-1:111122223333:key/abcd");
    let policy = crawler_policy(&env, "sales-landing", &names, &key);

    let kms = policy
        .statements()
        .iter()
        .find(|s| s.covers_action("kms:Decrypt"))
        .unwrap();
    assert_eq!(kms.resources, vec![key]);

    let put_events = policy
        .statements()
        .iter()
        .find(|s| s.covers_action("logs:PutLogEvents"))
        .unwrap();
    assert_eq!(
        put_events.resources,
        vec![Expr::literal(
            "arn:aws:logs:eu-west-1:991651053978:log-group:/aws-glue/crawlers:log-stream:datazone-sales-data-crawler"
        )]
    );
}

#[test]
fn test_security_configuration_shared() {
    let mut fixture = fixture();
    let datasets = [owned(&fixture, "testdata", true), external("sales")];
    let outputs = run(&mut fixture, &datasets).unwrap();

    let Resource::SecurityConfiguration(config) =
        resource(&fixture.graph, &outputs.security_configuration)
    else {
        panic!("security configuration expected");
    };
    assert_eq!(config.name, "datazone-Crawler-Security-Config");
    for dataset in &outputs.datasets {
        assert!(
            fixture
                .graph
                .dependencies_of(&dataset.crawler)
                .contains(&outputs.security_configuration)
        );
    }
}

#[test]
fn test_duplicate_dataset_rejected() {
    let mut fixture = fixture();
    let error = run(&mut fixture, &[external("sales"), external("sales")]).unwrap_err();
    assert!(matches!(error, DzRegError::InvalidDataset { .. }));
}

#[test]
fn test_separator_variants_rejected_before_declaring() {
    let mut fixture = fixture();
    let before = fixture.graph.len();
    let error = run(&mut fixture, &[external("sales-eu"), external("sales_eu")]).unwrap_err();
    match error {
        DzRegError::InvalidDataset { dataset, .. } => assert_eq!(dataset, "sales_eu"),
        other => panic!("expected invalid dataset, got {:?}", other),
    }
    assert_eq!(fixture.graph.len(), before);
}

#[test]
fn test_invalid_schedule_rejected() {
    let mut fixture = fixture();
    let mut dataset = external("sales");
    dataset.schedule = "rate(1 day)".to_string();
    assert!(matches!(
        run(&mut fixture, &[dataset]),
        Err(DzRegError::InvalidDataset { .. })
    ));
}

// Keeps one name per derived id prefix so `a-b` and `a_b` never meet.
fn dataset_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z][a-z0-9_-]{0,11}", 1..5).prop_map(|names| {
        let mut prefixes = BTreeMap::new();
        for name in names {
            let prefix = LogicalId::derive(&[name.as_str()]).unwrap();
            prefixes.entry(prefix).or_insert(name);
        }
        prefixes.into_values().collect()
    })
}

proptest! {
    #[test]
    fn test_output_independent_of_input_order(names in dataset_names()) {
        let forward: Vec<DatasetDescriptor> = names.iter().map(|n| external(n)).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let mut first = fixture();
        let mut second = fixture();
        let first_outputs = run(&mut first, &forward).unwrap();
        let second_outputs = run(&mut second, &reversed).unwrap();

        for name in &names {
            let a = first_outputs.dataset(name).unwrap();
            let b = second_outputs.dataset(name).unwrap();
            prop_assert_eq!(a, b);
            prop_assert_eq!(&a.names.database, &format!("datazone-{}-db", name));
            prop_assert_eq!(&a.names.crawler, &format!("datazone-{}-data-crawler", name));
            prop_assert_eq!(
                first.graph.ordering_dependencies_of(&a.table_grant),
                second.graph.ordering_dependencies_of(&b.table_grant)
            );
        }
        prop_assert_eq!(first.graph.len(), second.graph.len());
    }
}
